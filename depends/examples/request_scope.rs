use fibre_depends::{
  fetch_context_item, global, provider, ContainerContext, ContextResource, Initializer, Object,
  Provider, Resource,
};
use std::sync::Arc;
use std::time::Duration;

// A process-wide connection pool and a per-request transaction on top of it.
struct Pool {
  url: String,
}

struct Transaction {
  request_id: u64,
  pool: Arc<Pool>,
}

fn register() {
  let url = Arc::new(Object::new(String::from("postgres://localhost/app")));

  let pool = Arc::new(Resource::new(Initializer::new_async(
    (url,),
    |(url,)| async move {
      println!("Opening pool to {url}");
      Ok(Arc::new(Pool { url }))
    },
    |pool: Arc<Pool>| async move {
      println!("Closing pool to {}", pool.url);
      Ok(())
    },
  )));
  global().add(pool.clone());

  let transaction = Arc::new(ContextResource::new(Initializer::new_async(
    (pool,),
    |(pool,)| async move {
      let request_id = fetch_context_item::<u64>("request_id")
        .ok()
        .flatten()
        .unwrap_or_default();
      println!("[{request_id}] BEGIN");
      Ok(Arc::new(Transaction { request_id, pool }))
    },
    |tx: Arc<Transaction>| async move {
      println!("[{}] COMMIT on {}", tx.request_id, tx.pool.url);
      Ok(())
    },
  )));
  global().add(transaction);
}

async fn handle_request() -> String {
  let transaction = provider!(Arc<Transaction>);
  let tx = transaction.resolve_async().await.unwrap();
  tokio::time::sleep(Duration::from_millis(20)).await;
  // Resolving again inside the same request yields the same transaction.
  let again = transaction.resolve_async().await.unwrap();
  assert!(Arc::ptr_eq(&tx, &again));
  format!("request {} handled", tx.request_id)
}

#[tokio::main]
async fn main() {
  register();
  global().init_resources().await.unwrap();

  let requests: Vec<_> = (1..=3u64)
    .map(|request_id| {
      let context = ContainerContext::new().with_item("request_id", request_id);
      tokio::spawn(context.run_async(handle_request()))
    })
    .collect();

  for request in requests {
    println!("{}", request.await.unwrap().unwrap());
  }

  global().tear_down().await.unwrap();
}
