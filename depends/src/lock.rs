use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// A waiter parked on a `CreationLock`.
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// Who holds a `CreationLock`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Holder {
  Blocking,
  Suspending,
}

struct LockState {
  holder: Option<Holder>,
  waiters: VecDeque<Waiter>,
}

/// A mutual-exclusion lock that guards first-time construction of a scope record.
///
/// Blocking callers park their thread, async callers register a waker and
/// suspend. Both flavors contend on the same state, and the guard is `Send`,
/// so an async caller may hold it across await points.
///
/// A blocking caller never parks behind an async holder: that holder may be
/// waiting to be polled by the very thread that would park.
pub(crate) struct CreationLock {
  state: Mutex<LockState>,
}

impl CreationLock {
  pub(crate) fn new() -> Self {
    Self {
      state: Mutex::new(LockState {
        holder: None,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Acquires the lock, blocking the current thread while another blocking
  /// caller holds it.
  ///
  /// Returns `None` without blocking when an async caller holds the lock.
  pub(crate) fn lock_sync(&self) -> Option<CreationGuard<'_>> {
    loop {
      {
        let mut state = self.state.lock();
        match state.holder {
          None => {
            state.holder = Some(Holder::Blocking);
            return Some(CreationGuard { lock: self });
          }
          Some(Holder::Suspending) => return None,
          Some(Holder::Blocking) => state.waiters.push_back(Waiter::Sync(thread::current())),
        }
      }
      // Spurious unparks just loop back to the check.
      thread::park();
    }
  }

  /// Acquires the lock without blocking the thread.
  pub(crate) fn lock(&self) -> LockFuture<'_> {
    LockFuture { lock: self }
  }

  #[cfg(test)]
  pub(crate) fn is_locked(&self) -> bool {
    self.state.lock().holder.is_some()
  }

  fn unlock(&self) {
    let waiters: Vec<Waiter> = {
      let mut state = self.state.lock();
      state.holder = None;
      state.waiters.drain(..).collect()
    };
    // Every waiter re-checks, so a waiter whose task was cancelled can't
    // swallow the only wakeup.
    for waiter in waiters {
      waiter.wake();
    }
  }
}

/// RAII guard for a held `CreationLock`.
#[must_use = "the creation lock is released as soon as the guard is dropped"]
pub(crate) struct CreationGuard<'a> {
  lock: &'a CreationLock,
}

impl Drop for CreationGuard<'_> {
  fn drop(&mut self) {
    self.lock.unlock();
  }
}

/// The `Future` returned by `CreationLock::lock()`.
#[must_use = "futures do nothing unless you .await or poll them"]
pub(crate) struct LockFuture<'a> {
  lock: &'a CreationLock,
}

impl<'a> Future for LockFuture<'a> {
  type Output = CreationGuard<'a>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let lock = self.lock;
    let mut state = lock.state.lock();
    if state.holder.is_none() {
      state.holder = Some(Holder::Suspending);
      return Poll::Ready(CreationGuard { lock });
    }

    let already_queued = state
      .waiters
      .iter()
      .any(|w| matches!(w, Waiter::Async(waker) if waker.will_wake(cx.waker())));
    if !already_queued {
      state.waiters.push_back(Waiter::Async(cx.waker().clone()));
    }

    Poll::Pending
  }
}
