use fibre_depends::{Factory, Object, Provider, Singleton};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

// A simple service that gets a unique ID upon creation.
struct RequestTracker {
  id: usize,
}

// A global, thread-safe counter to generate unique IDs.
static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() {
  let prefix = Arc::new(Object::new(String::from("tracker")));

  // This factory will only be called ONCE.
  let singleton = Singleton::new((prefix.clone(),), |(prefix,)| {
    println!("Creating SINGLETON {prefix}...");
    Arc::new(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  });

  // This factory will be called EVERY time the service is resolved.
  let factory = Factory::new((prefix,), |(prefix,)| {
    println!("Creating FACTORY {prefix}...");
    Arc::new(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  });

  println!("--- Resolving Singletons ---");
  let s1 = singleton.resolve_sync().unwrap();
  let s2 = singleton.resolve_sync().unwrap();
  println!("Singleton 1 ID: {}, Singleton 2 ID: {}", s1.id, s2.id);
  assert!(Arc::ptr_eq(&s1, &s2), "Singleton instances should be identical");

  println!("--- Resolving Factories ---");
  let f1 = factory.resolve_sync().unwrap();
  let f2 = factory.resolve_sync().unwrap();
  println!("Factory 1 ID: {}, Factory 2 ID: {}", f1.id, f2.id);
  assert!(!Arc::ptr_eq(&f1, &f2), "Factory instances should differ");

  println!("--- Overriding ---");
  singleton.override_with(Arc::new(RequestTracker { id: 999 }));
  println!("Overridden ID: {}", singleton.resolve_sync().unwrap().id);
  singleton.reset_override();
  println!("Reset ID: {}", singleton.resolve_sync().unwrap().id);
}
