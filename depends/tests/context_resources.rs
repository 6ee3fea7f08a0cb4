use fibre_depends::{
  fetch_context_item, ContainerContext, ContextResource, Error, InContainerContext, Initializer,
  Provider,
};
use parking_lot::Mutex;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tokio::sync::Notify;

// --- Test Fixtures ---

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct Session {
  id: usize,
}

/// A session resource that numbers each acquisition and logs releases.
fn session_resource(
  counter: Arc<AtomicUsize>,
  log: Log,
) -> Arc<ContextResource<(), Arc<Session>>> {
  Arc::new(ContextResource::new(Initializer::new(
    (),
    move |()| {
      Ok(Arc::new(Session {
        id: counter.fetch_add(1, Ordering::SeqCst),
      }))
    },
    move |session: Arc<Session>| {
      log.lock().push(format!("release session {}", session.id));
      Ok(())
    },
  )))
}

fn async_session_resource(log: Log) -> Arc<ContextResource<(), Arc<Session>>> {
  Arc::new(ContextResource::new(Initializer::new_async(
    (),
    |()| async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok(Arc::new(Session { id: 0 }))
    },
    move |session: Arc<Session>| {
      let log = log.clone();
      async move {
        log.lock().push(format!("async release session {}", session.id));
        Ok(())
      }
    },
  )))
}

#[derive(Default)]
struct Counters {
  acquired: AtomicUsize,
  released: AtomicUsize,
  started: Notify,
}

/// An async session whose acquisition announces itself, then takes a while.
fn slow_session_resource(counters: Arc<Counters>) -> Arc<ContextResource<(), Arc<Session>>> {
  Arc::new(ContextResource::new(Initializer::new_async(
    (),
    {
      let counters = counters.clone();
      move |()| {
        let counters = counters.clone();
        async move {
          let id = counters.acquired.fetch_add(1, Ordering::SeqCst);
          counters.started.notify_one();
          tokio::time::sleep(Duration::from_millis(30)).await;
          Ok(Arc::new(Session { id }))
        }
      }
    },
    move |_session| {
      let counters = counters.clone();
      async move {
        counters.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }
    },
  )))
}

// --- Scoping Tests ---

#[test]
fn test_resolution_outside_a_context_fails() {
  // Arrange
  let session = session_resource(Arc::default(), Log::default());

  // Act
  let result = session.resolve_sync();

  // Assert
  assert!(matches!(result, Err(Error::ScopeNotSet)));
}

#[test]
fn test_one_instance_per_context() {
  // Arrange
  let counter = Arc::new(AtomicUsize::new(0));
  let log = Log::default();
  let session = session_resource(counter.clone(), log.clone());

  // Act
  let (a, b) = ContainerContext::new()
    .run(|| (session.resolve_sync().unwrap(), session.resolve_sync().unwrap()))
    .unwrap();
  let c = ContainerContext::new()
    .run(|| session.resolve_sync().unwrap())
    .unwrap();

  // Assert
  assert!(Arc::ptr_eq(&a, &b));
  assert!(!Arc::ptr_eq(&a, &c));
  assert_eq!(counter.load(Ordering::SeqCst), 2);
  assert_eq!(
    *log.lock(),
    vec!["release session 0".to_string(), "release session 1".to_string()]
  );
}

#[test]
fn test_nested_context_shadows_outer() {
  // Arrange
  let log = Log::default();
  let session = session_resource(Arc::default(), log.clone());
  let outer = ContainerContext::new();
  let inner = ContainerContext::new();

  // Act
  outer.enter().unwrap();
  let outer_session = session.resolve_sync().unwrap();

  inner.enter().unwrap();
  let inner_session = session.resolve_sync().unwrap();
  inner.exit().unwrap();

  let outer_again = session.resolve_sync().unwrap();
  outer.exit().unwrap();

  // Assert
  assert!(!Arc::ptr_eq(&outer_session, &inner_session));
  assert!(Arc::ptr_eq(&outer_session, &outer_again));
  assert_eq!(
    *log.lock(),
    vec!["release session 1".to_string(), "release session 0".to_string()]
  );
}

#[test]
fn test_teardown_is_reverse_construction_order() {
  // Arrange
  let log = Log::default();
  let make = |name: &'static str| {
    let log = log.clone();
    Arc::new(ContextResource::new(Initializer::new(
      (),
      move |()| Ok(name),
      move |name| {
        log.lock().push(name.to_string());
        Ok(())
      },
    )))
  };
  let database = make("database");
  let transaction = {
    let log = log.clone();
    Arc::new(ContextResource::new(Initializer::new(
      (database.clone(),),
      |(db,)| Ok(format!("transaction on {db}")),
      move |_| {
        log.lock().push("transaction".to_string());
        Ok(())
      },
    )))
  };
  let audit = make("audit");

  // Act: the transaction pulls the database in first.
  ContainerContext::new()
    .run(|| {
      audit.resolve_sync().unwrap();
      transaction.resolve_sync().unwrap();
    })
    .unwrap();

  // Assert
  pretty_assertions::assert_eq!(*log.lock(), vec!["transaction", "database", "audit"]);
}

#[test]
fn test_teardown_continues_after_a_release_failure() {
  // Arrange
  let log = Log::default();
  let failing = Arc::new(ContextResource::new(Initializer::new(
    (),
    |()| Ok(1u8),
    |_| Err("disk on fire".into()),
  )));
  let healthy = session_resource(Arc::default(), log.clone());

  // Act
  let context = ContainerContext::new();
  context.enter().unwrap();
  healthy.resolve_sync().unwrap();
  failing.resolve_sync().unwrap();
  let exited = context.exit();

  // Assert
  match exited {
    Err(Error::Release { source, .. }) => assert_eq!(source.to_string(), "disk on fire"),
    other => panic!("expected a release failure, got {:?}", other),
  }
  assert_eq!(*log.lock(), vec!["release session 0".to_string()]);
}

#[test]
fn test_context_items() {
  // Arrange
  let context = ContainerContext::new()
    .with_item("request_id", 42u64)
    .with_item("user", String::from("ada"));

  // Act
  let (request_id, user, missing, wrong_type) = context
    .run(|| {
      (
        fetch_context_item::<u64>("request_id").unwrap(),
        fetch_context_item::<String>("user").unwrap(),
        fetch_context_item::<u64>("tenant").unwrap(),
        fetch_context_item::<String>("request_id").unwrap(),
      )
    })
    .unwrap();

  // Assert
  assert_eq!(request_id, Some(42));
  assert_eq!(user.as_deref(), Some("ada"));
  assert_eq!(missing, None);
  assert_eq!(wrong_type, None);
  assert!(matches!(
    fetch_context_item::<u64>("request_id"),
    Err(Error::ScopeNotSet)
  ));
}

// --- Async Scoping Tests ---

#[tokio::test]
async fn test_async_resource_in_sync_context_fails() {
  // Arrange
  let session = async_session_resource(Log::default());
  let context = ContainerContext::new();

  // Act
  context.enter().unwrap();
  let result = session.resolve_async().await;
  context.exit().unwrap();

  // Assert
  assert!(matches!(result, Err(Error::AsyncInSyncContext { .. })));
}

#[tokio::test]
async fn test_async_resource_lifecycle() {
  // Arrange
  let log = Log::default();
  let session = async_session_resource(log.clone());
  assert!(matches!(
    session.resolve_sync(),
    Err(Error::SynchronousResolution { .. })
  ));

  // Act
  let same = ContainerContext::new()
    .run_async(async {
      let a = session.resolve_async().await.unwrap();
      let b = session.resolve_async().await.unwrap();
      assert!(matches!(
        session.resolve_sync(),
        Err(Error::SynchronousResolution { .. })
      ));
      Arc::ptr_eq(&a, &b)
    })
    .await
    .unwrap();

  // Assert
  assert!(same);
  assert_eq!(*log.lock(), vec!["async release session 0".to_string()]);
}

#[tokio::test]
async fn test_sync_exit_refuses_async_release() {
  // Arrange
  let log = Log::default();
  let session = async_session_resource(log.clone());
  let context = ContainerContext::new();

  // Act
  let exited = async {
    context.async_enter().await.unwrap();
    session.resolve_async().await.unwrap();
    context.exit()
  }
  .in_current_context()
  .await;

  // Assert
  assert!(matches!(exited, Err(Error::AsyncInSyncContext { .. })));
  assert!(log.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_isolated() {
  // Arrange
  let counter = Arc::new(AtomicUsize::new(0));
  let session = session_resource(counter.clone(), Log::default());

  // Act: every request resolves twice with a suspension in between.
  let requests: Vec<_> = (0..8)
    .map(|_| {
      let session = session.clone();
      tokio::spawn(ContainerContext::new().run_async(async move {
        let first = session.resolve_async().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = session.resolve_async().await.unwrap();
        (first, second)
      }))
    })
    .collect();

  let mut ids = Vec::new();
  for request in requests {
    let (first, second) = request.await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    ids.push(first.id);
  }

  // Assert
  ids.sort_unstable();
  assert_eq!(ids, (0..8).collect::<Vec<_>>());
  assert_eq!(counter.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_spawned_task_inherits_the_context() {
  // Arrange
  let session = session_resource(Arc::default(), Log::default());

  // Act
  let (parent, child, orphan) = ContainerContext::new()
    .run_async({
      let session = session.clone();
      async move {
        let parent = session.resolve_async().await.unwrap();
        let inherited = tokio::spawn({
          let session = session.clone();
          async move { session.resolve_async().await.unwrap() }.in_current_context()
        });
        let detached = tokio::spawn({
          let session = session.clone();
          async move { session.resolve_async().await }
        });
        (parent, inherited.await.unwrap(), detached.await.unwrap())
      }
    })
    .await
    .unwrap();

  // Assert
  assert!(Arc::ptr_eq(&parent, &child));
  assert!(matches!(orphan, Err(Error::ScopeNotSet)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_in_one_context_share_one_instance() {
  // Arrange
  let counters = Arc::new(Counters::default());
  let session = slow_session_resource(counters.clone());

  // Act
  let sessions = ContainerContext::new()
    .run_async({
      let session = session.clone();
      async move {
        let callers: Vec<_> = (0..8)
          .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.resolve_async().await.unwrap() }.in_current_context())
          })
          .collect();
        let mut sessions = Vec::new();
        for caller in callers {
          sessions.push(caller.await.unwrap());
        }
        sessions
      }
    })
    .await
    .unwrap();

  // Assert
  assert_eq!(sessions.len(), 8);
  assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
  assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
  assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn test_acquisition_outliving_its_context_is_released() {
  // Arrange
  let counters = Arc::new(Counters::default());
  let session = slow_session_resource(counters.clone());

  // Act: the body returns while the spawned acquisition is still sleeping.
  let pending = ContainerContext::new()
    .run_async({
      let session = session.clone();
      let counters = counters.clone();
      async move {
        let pending = tokio::spawn(async move { session.resolve_async().await }.in_current_context());
        counters.started.notified().await;
        pending
      }
    })
    .await
    .unwrap();
  let outcome = pending.await.unwrap();

  // Assert
  assert!(matches!(outcome, Err(Error::ScopeNotActive)));
  assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
  assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sync_resource_over_async_dependency_fails_fast() {
  // Arrange
  let token = Arc::new(fibre_depends::Factory::new_async((), |()| async { 7u64 }));
  let session = Arc::new(ContextResource::new(Initializer::new(
    (token,),
    |(token,)| Ok(token),
    |_| Ok(()),
  )));

  // Act
  let result = ContainerContext::new().run(|| session.resolve_sync()).unwrap();

  // Assert
  assert!(session.requires_async());
  assert!(matches!(result, Err(Error::SynchronousResolution { .. })));
}
