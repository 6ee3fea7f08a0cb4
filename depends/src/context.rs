//! Container contexts: the ambient, nestable scope that owns scope-bound resources.

use crate::core::ProviderId;
use crate::error::{Error, FirstFailure, Result};
use crate::record::{ErasedRecord, ScopeRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

type ContextItem = Arc<dyn Any + Send + Sync>;

thread_local! {
  // The innermost active frame for the code currently running on this thread.
  // `ContextFuture` swaps a task's own frame in and out around every poll, so
  // the slot always reflects the logical call chain being executed.
  static CURRENT: RefCell<Option<Arc<Frame>>> = const { RefCell::new(None) };

  // How many `ContextFuture` polls are on this thread's stack.
  static POLL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn inside_context_future() -> bool {
  POLL_DEPTH.with(|depth| depth.get() > 0)
}

/// One level of the ambient stack. Frames are immutable and parent-linked,
/// so entering a nested context shadows its parent without touching it.
pub(crate) struct Frame {
  scope: Arc<ScopeState>,
  parent: Option<Arc<Frame>>,
}

fn current_frame() -> Option<Arc<Frame>> {
  CURRENT.with(|current| current.borrow().clone())
}

fn install(frame: Arc<Frame>) {
  CURRENT.with(|current| *current.borrow_mut() = Some(frame));
}

impl Frame {
  // Frames are rebuilt by `unlink`, so identity is the scope's, not the frame's.
  fn is(&self, other: &Frame) -> bool {
    Arc::ptr_eq(&self.scope, &other.scope)
  }
}

fn contains(chain: &Option<Arc<Frame>>, target: &Frame) -> bool {
  let mut cursor = chain.as_ref();
  while let Some(frame) = cursor {
    if frame.is(target) {
      return true;
    }
    cursor = frame.parent.as_ref();
  }
  false
}

// Rebuilds `chain` without `target`, sharing every frame below it.
fn unlink(chain: Option<Arc<Frame>>, target: &Frame) -> Option<Arc<Frame>> {
  match chain {
    None => None,
    Some(frame) if frame.is(target) => frame.parent.clone(),
    Some(frame) => Some(Arc::new(Frame {
      scope: frame.scope.clone(),
      parent: unlink(frame.parent.clone(), target),
    })),
  }
}

fn uninstall(target: &Frame) {
  CURRENT.with(|current| {
    let mut current = current.borrow_mut();
    if contains(&current, target) {
      *current = unlink(current.take(), target);
    }
  });
}

/// Removes a frame from the ambient stack on every exit path, unwinding included.
struct Uninstall<'a>(&'a Arc<Frame>);

impl Drop for Uninstall<'_> {
  fn drop(&mut self) {
    uninstall(self.0);
  }
}

/// The live registry behind an entered `ContainerContext`.
pub(crate) struct ScopeState {
  is_async: bool,
  active: AtomicBool,
  items: HashMap<String, ContextItem>,
  entries: DashMap<ProviderId, Arc<dyn ErasedRecord>>,
  constructed: Mutex<Vec<Arc<dyn ErasedRecord>>>,
}

impl ScopeState {
  fn new(is_async: bool, items: HashMap<String, ContextItem>) -> Self {
    Self {
      is_async,
      active: AtomicBool::new(true),
      items,
      entries: DashMap::new(),
      constructed: Mutex::new(Vec::new()),
    }
  }

  /// Locates or creates the record of `id` in this scope.
  pub(crate) fn record_for<T>(
    &self,
    id: ProviderId,
    label: &'static str,
  ) -> Result<Arc<ScopeRecord<T>>>
  where
    T: Clone + Send + Sync + 'static,
  {
    if !self.active.load(Ordering::Acquire) {
      return Err(Error::ScopeNotActive);
    }
    let erased = self
      .entries
      .entry(id)
      .or_insert_with(|| -> Arc<dyn ErasedRecord> {
        Arc::new(ScopeRecord::<T>::new(label, self.is_async))
      })
      .clone();
    erased
      .into_any()
      .downcast::<ScopeRecord<T>>()
      .map_err(|_| Error::Internal(format!("scope record for {:?} holds another type", id)))
  }

  /// Registers a record whose instance was just constructed. Teardown runs in
  /// reverse order of these registrations, so dependencies outlive dependents.
  ///
  /// Hands the record back when the scope was torn down while it was being
  /// constructed; the caller must release it.
  fn register_constructed(
    &self,
    record: Arc<dyn ErasedRecord>,
  ) -> Option<Arc<dyn ErasedRecord>> {
    let mut constructed = self.constructed.lock();
    if !self.active.load(Ordering::Acquire) {
      return Some(record);
    }
    constructed.push(record);
    None
  }

  /// Adopts a freshly constructed record, or releases it and fails with
  /// [`Error::ScopeNotActive`] when the scope has already been torn down.
  pub(crate) fn adopt_sync(&self, record: Arc<dyn ErasedRecord>) -> Result<()> {
    let Some(orphan) = self.register_constructed(record) else {
      return Ok(());
    };
    tracing::debug!(provider = orphan.label(), "context exited during construction, releasing");
    orphan.tear_down_sync()?;
    Err(Error::ScopeNotActive)
  }

  /// Async counterpart of [`ScopeState::adopt_sync`].
  pub(crate) async fn adopt(&self, record: Arc<dyn ErasedRecord>) -> Result<()> {
    let Some(orphan) = self.register_constructed(record) else {
      return Ok(());
    };
    tracing::debug!(provider = orphan.label(), "context exited during construction, releasing");
    orphan.tear_down().await?;
    Err(Error::ScopeNotActive)
  }

  // Deactivates under the `constructed` lock, so every record is either
  // taken here or refused by `register_constructed`.
  fn close(&self) -> Vec<Arc<dyn ErasedRecord>> {
    let mut constructed = self.constructed.lock();
    self.active.store(false, Ordering::Release);
    std::mem::take(&mut *constructed)
  }

  fn tear_down_sync(&self) -> Result<()> {
    let records = self.close();
    tracing::debug!(records = records.len(), "tearing down container context");

    let mut failures = FirstFailure::default();
    for record in records.iter().rev() {
      tracing::trace!(provider = record.label(), "releasing");
      failures.absorb(record.tear_down_sync());
    }
    self.entries.clear();
    failures.into_result()
  }

  async fn tear_down(&self) -> Result<()> {
    let records = self.close();
    tracing::debug!(records = records.len(), "tearing down container context");

    let mut failures = FirstFailure::default();
    for record in records.iter().rev() {
      tracing::trace!(provider = record.label(), "releasing");
      failures.absorb(record.tear_down().await);
    }
    self.entries.clear();
    failures.into_result()
  }
}

/// Returns the innermost active scope of the current call chain.
pub(crate) fn current_scope() -> Result<Arc<ScopeState>> {
  CURRENT
    .with(|current| current.borrow().as_ref().map(|frame| frame.scope.clone()))
    .ok_or(Error::ScopeNotSet)
}

/// Reads an item stashed in the innermost container context at entry.
///
/// Returns `Ok(None)` when the key is absent or holds another type, and
/// [`Error::ScopeNotSet`] outside of any container context.
pub fn fetch_context_item<T>(key: &str) -> Result<Option<T>>
where
  T: Clone + 'static,
{
  let scope = current_scope()?;
  Ok(scope.items.get(key).and_then(|item| item.downcast_ref::<T>()).cloned())
}

enum Phase {
  Unentered,
  Active(Arc<Frame>),
  TornDown,
}

/// A scope that owns every [`ContextResource`](crate::ContextResource)
/// instance constructed while it is the innermost active context.
///
/// A context goes through `Unentered → Active → TornDown` exactly once.
/// Entering pushes it onto the ambient stack of the current call chain;
/// exiting releases its resources and pops it.
///
/// Resources are released in reverse order of the moment their construction
/// *completed*, not the moment they were first requested. A resource acquired
/// while building another one finishes first, so it is released after the
/// one that depends on it. A construction still running when the context
/// exits is released as soon as it completes, and its caller receives
/// [`Error::ScopeNotActive`] instead of the instance.
///
/// Contexts entered with [`enter`](Self::enter) are synchronous and refuse
/// asynchronous resources. Contexts entered with
/// [`async_enter`](Self::async_enter) or [`run_async`](Self::run_async)
/// accept both kinds.
///
/// # Examples
///
/// ```
/// use fibre_depends::{ContainerContext, ContextResource, Initializer, Provider};
/// use std::sync::Arc;
///
/// let session = ContextResource::new(Initializer::new(
///   (),
///   |()| Ok(Arc::new(String::from("session"))),
///   |_session| Ok(()),
/// ));
///
/// let same = ContainerContext::new()
///   .run(|| {
///     let a = session.resolve_sync().unwrap();
///     let b = session.resolve_sync().unwrap();
///     Arc::ptr_eq(&a, &b)
///   })
///   .unwrap();
/// assert!(same);
/// ```
pub struct ContainerContext {
  items: HashMap<String, ContextItem>,
  phase: Mutex<Phase>,
}

impl ContainerContext {
  /// Creates a new, unentered context with no items.
  pub fn new() -> Self {
    Self {
      items: HashMap::new(),
      phase: Mutex::new(Phase::Unentered),
    }
  }

  /// Stashes an item readable through [`fetch_context_item`] while this
  /// context is the innermost one.
  pub fn with_item<V>(mut self, key: impl Into<String>, value: V) -> Self
  where
    V: Any + Send + Sync,
  {
    self.items.insert(key.into(), Arc::new(value));
    self
  }

  pub fn is_active(&self) -> bool {
    matches!(*self.phase.lock(), Phase::Active(_))
  }

  /// Whether the context was entered in a mode that permits asynchronous
  /// resources. `None` unless the context is active.
  pub fn is_async(&self) -> Option<bool> {
    match &*self.phase.lock() {
      Phase::Active(frame) => Some(frame.scope.is_async),
      _ => None,
    }
  }

  fn activate(&self, is_async: bool) -> Result<Arc<Frame>> {
    let mut phase = self.phase.lock();
    if !matches!(*phase, Phase::Unentered) {
      return Err(Error::ScopeAlreadyEntered);
    }
    let frame = Arc::new(Frame {
      scope: Arc::new(ScopeState::new(is_async, self.items.clone())),
      parent: current_frame(),
    });
    *phase = Phase::Active(frame.clone());
    tracing::debug!(is_async, "container context entered");
    Ok(frame)
  }

  fn deactivate(&self) -> Result<Arc<Frame>> {
    let mut phase = self.phase.lock();
    match std::mem::replace(&mut *phase, Phase::TornDown) {
      Phase::Active(frame) => Ok(frame),
      previous => {
        *phase = previous;
        Err(Error::ScopeNotActive)
      }
    }
  }

  /// Enters the context in synchronous mode.
  pub fn enter(&self) -> Result<()> {
    install(self.activate(false)?);
    Ok(())
  }

  /// Enters the context in asynchronous mode.
  ///
  /// The context lands on the ambient stack of the enclosing
  /// [`ContextFuture`], so it follows that task across await points and
  /// threads and stays invisible to every other task. Called outside a
  /// `ContextFuture` it fails with [`Error::UnboundAsyncContext`] and leaves
  /// the context unentered. Wrap the task with
  /// [`InContainerContext::in_current_context`], or prefer
  /// [`run_async`](Self::run_async).
  pub async fn async_enter(&self) -> Result<()> {
    if !inside_context_future() {
      return Err(Error::UnboundAsyncContext);
    }
    install(self.activate(true)?);
    Ok(())
  }

  /// Releases every resource constructed in this context, then removes the
  /// context from the ambient stack.
  ///
  /// All releases are attempted; the first failure is returned. Asynchronously
  /// acquired resources cannot be released here and report
  /// [`Error::AsyncInSyncContext`].
  pub fn exit(&self) -> Result<()> {
    let frame = self.deactivate()?;
    let _uninstall = Uninstall(&frame);
    frame.scope.tear_down_sync()
  }

  /// Asynchronous counterpart of [`exit`](Self::exit) that can release both
  /// kinds of resources.
  pub async fn async_exit(&self) -> Result<()> {
    let frame = self.deactivate()?;
    let _uninstall = Uninstall(&frame);
    frame.scope.tear_down().await
  }

  /// Enters the context synchronously, runs `f`, and exits.
  ///
  /// The exit runs even when `f` panics. When the exit fails, the error is
  /// returned and the output of `f` is dropped; its resources have been
  /// released by then.
  pub fn run<R>(self, f: impl FnOnce() -> R) -> Result<R> {
    self.enter()?;
    let guard = ExitOnDrop(&self);
    let output = f();
    std::mem::forget(guard);
    self.exit()?;
    Ok(output)
  }

  /// Enters the context asynchronously around `fut`, and exits once it completes.
  ///
  /// The context is bound to `fut` itself rather than to the calling thread,
  /// so it is safe to use from any task. This is the per-request boundary for
  /// network adapters.
  ///
  /// As with [`run`](Self::run), a failed exit returns the error and drops
  /// the output of `fut`.
  pub async fn run_async<F>(self, fut: F) -> Result<F::Output>
  where
    F: Future,
  {
    let frame = self.activate(true)?;
    let output = ContextFuture::new(fut, Some(frame)).await;
    self.async_exit().await?;
    Ok(output)
  }
}

impl Default for ContainerContext {
  fn default() -> Self {
    Self::new()
  }
}

/// Cloning yields a fresh, unentered context carrying the same items.
impl Clone for ContainerContext {
  fn clone(&self) -> Self {
    Self {
      items: self.items.clone(),
      phase: Mutex::new(Phase::Unentered),
    }
  }
}

impl fmt::Debug for ContainerContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let phase = match &*self.phase.lock() {
      Phase::Unentered => "Unentered",
      Phase::Active(_) => "Active",
      Phase::TornDown => "TornDown",
    };
    f.debug_struct("ContainerContext")
      .field("phase", &phase)
      .field("items", &self.items.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl Drop for ContainerContext {
  fn drop(&mut self) {
    let Phase::Active(frame) = std::mem::replace(self.phase.get_mut(), Phase::TornDown) else {
      return;
    };
    tracing::warn!("container context dropped while active, releasing synchronous resources");
    uninstall(&frame);
    if let Err(error) = frame.scope.tear_down_sync() {
      tracing::warn!(%error, "release of a dropped container context failed");
    }
  }
}

struct ExitOnDrop<'a>(&'a ContainerContext);

impl Drop for ExitOnDrop<'_> {
  fn drop(&mut self) {
    if let Err(error) = self.0.exit() {
      tracing::warn!(%error, "container context exit during unwind failed");
    }
  }
}

/// A future that carries its own ambient context stack.
///
/// Every poll installs the future's stack into the current thread and saves
/// it back afterwards, so contexts entered inside the future follow it across
/// threads and never leak into other tasks.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct ContextFuture<F> {
  inner: Pin<Box<F>>,
  frame: Option<Arc<Frame>>,
}

impl<F: Future> ContextFuture<F> {
  fn new(fut: F, frame: Option<Arc<Frame>>) -> Self {
    Self {
      inner: Box::pin(fut),
      frame,
    }
  }

  /// Binds `fut` to the contexts active at the call site.
  pub fn current(fut: F) -> Self {
    Self::new(fut, current_frame())
  }
}

struct RestoreFrame<'a> {
  saved: &'a mut Option<Arc<Frame>>,
  previous: Option<Arc<Frame>>,
}

impl Drop for RestoreFrame<'_> {
  fn drop(&mut self) {
    let previous = self.previous.take();
    *self.saved = CURRENT.with(|current| current.replace(previous));
    POLL_DEPTH.with(|depth| depth.set(depth.get() - 1));
  }
}

impl<F: Future> Future for ContextFuture<F> {
  type Output = F::Output;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    let previous = CURRENT.with(|current| current.replace(this.frame.take()));
    POLL_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let _restore = RestoreFrame {
      saved: &mut this.frame,
      previous,
    };
    this.inner.as_mut().poll(cx)
  }
}

/// Extension for carrying the current contexts into another future, such as
/// a spawned task.
pub trait InContainerContext: Future + Sized {
  fn in_current_context(self) -> ContextFuture<Self> {
    ContextFuture::current(self)
  }
}

impl<F: Future> InContainerContext for F {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn enter_and_exit_maintain_the_ambient_stack() {
    assert!(current_scope().is_err());

    let outer = ContainerContext::new().with_item("level", "outer");
    outer.enter().unwrap();
    assert_eq!(fetch_context_item::<&str>("level").unwrap(), Some("outer"));

    let inner = ContainerContext::new().with_item("level", "inner");
    inner.enter().unwrap();
    assert_eq!(fetch_context_item::<&str>("level").unwrap(), Some("inner"));

    inner.exit().unwrap();
    assert_eq!(fetch_context_item::<&str>("level").unwrap(), Some("outer"));

    outer.exit().unwrap();
    assert!(matches!(current_scope(), Err(Error::ScopeNotSet)));
  }

  #[test]
  fn out_of_order_exit_keeps_the_inner_frame() {
    let outer = ContainerContext::new().with_item("level", "outer");
    let inner = ContainerContext::new().with_item("level", "inner");
    outer.enter().unwrap();
    inner.enter().unwrap();

    outer.exit().unwrap();
    assert_eq!(fetch_context_item::<&str>("level").unwrap(), Some("inner"));

    inner.exit().unwrap();
    assert!(current_scope().is_err());
  }

  #[test]
  fn phases_are_enforced() {
    let ctx = ContainerContext::new();
    assert!(matches!(ctx.exit(), Err(Error::ScopeNotActive)));

    ctx.enter().unwrap();
    assert!(matches!(ctx.enter(), Err(Error::ScopeAlreadyEntered)));
    assert_eq!(ctx.is_async(), Some(false));
    ctx.exit().unwrap();

    assert!(matches!(ctx.exit(), Err(Error::ScopeNotActive)));
    assert!(matches!(ctx.enter(), Err(Error::ScopeAlreadyEntered)));
    assert!(!ctx.clone().is_active());
  }

  #[test]
  fn run_exits_when_the_closure_panics() {
    let result = std::panic::catch_unwind(|| {
      ContainerContext::new().run(|| panic!("boom")).unwrap();
    });
    assert!(result.is_err());
    assert!(current_scope().is_err());
  }

  #[tokio::test]
  async fn context_future_isolates_tasks() {
    let ctx = ContainerContext::new().with_item("request", 7_u32);
    let seen = ctx
      .run_async(async {
        let inside = fetch_context_item::<u32>("request").unwrap();
        tokio::task::yield_now().await;
        let after_yield = fetch_context_item::<u32>("request").unwrap();
        (inside, after_yield)
      })
      .await
      .unwrap();

    assert_eq!(seen, (Some(7), Some(7)));
    assert!(current_scope().is_err());
  }

  #[tokio::test]
  async fn async_enter_requires_a_context_future() {
    let ctx = ContainerContext::new();
    assert!(matches!(ctx.async_enter().await, Err(Error::UnboundAsyncContext)));
    assert!(!ctx.is_active());

    let seen = async {
      ctx.async_enter().await.unwrap();
      let seen = fetch_context_item::<u8>("missing").is_ok();
      ctx.async_exit().await.unwrap();
      seen
    }
    .in_current_context()
    .await;

    assert!(seen);
    assert!(current_scope().is_err());
  }

  #[tokio::test(flavor = "current_thread")]
  async fn async_enter_is_invisible_to_other_tasks_on_the_thread() {
    let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();

    let owner = tokio::spawn(
      async move {
        let ctx = ContainerContext::new().with_item("owner", "task-a");
        ctx.async_enter().await.unwrap();
        entered_tx.send(()).unwrap();
        done_rx.await.unwrap();
        let still_mine = fetch_context_item::<&str>("owner").unwrap();
        ctx.async_exit().await.unwrap();
        still_mine
      }
      .in_current_context(),
    );
    entered_rx.await.unwrap();

    let bystander = tokio::spawn(async { fetch_context_item::<&str>("owner") })
      .await
      .unwrap();
    assert!(matches!(bystander, Err(Error::ScopeNotSet)));
    assert!(current_scope().is_err());

    done_tx.send(()).unwrap();
    assert_eq!(owner.await.unwrap(), Some("task-a"));
  }

  #[test]
  fn run_reports_a_failed_exit() {
    let failing = crate::ContextResource::new(crate::Initializer::new(
      (),
      |()| Ok(1u8),
      |_| Err("release refused".into()),
    ));

    let result = ContainerContext::new().run(|| crate::Provider::resolve_sync(&failing).unwrap());

    assert!(matches!(result, Err(Error::Release { .. })));
    assert!(current_scope().is_err());
  }
}
