use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex,
};

use tincture::{
    Binder, ClassBuilder, Constructor, Dependency, Field, Injectable, Injector, InstantiateErrorKind, Method, ProvisionErrorKind,
    ResolveErrorKind, Slot,
};
use tracing_test::traced_test;

struct Engine;

impl Injectable for Engine {
    fn describe(class: &mut ClassBuilder<Self>) {
        class.constructor(Constructor::new("new", |_| Ok(Engine)));
    }
}

struct Service {
    engine: Slot<Engine>,
    events: parking_lot::Mutex<Vec<String>>,
}

impl Service {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl Injectable for Service {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| {
                Ok(Service {
                    engine: Slot::empty(),
                    events: parking_lot::Mutex::new(vec!["constructor".to_owned()]),
                })
            }))
            .field(Field::new("engine", |this: &Self| &this.engine))
            .method(
                Method::new("configure", |this: &Self, args| {
                    args.get::<Engine>(0)?;
                    this.record(format!("configure(engine set: {})", this.engine.is_set()));
                    Ok(())
                })
                .param("engine", Dependency::of::<Engine>()),
            )
            .post_construct("prepare", 0, |this| {
                this.record(format!("prepare(engine set: {})", this.engine.is_set()));
                Ok(())
            })
            .post_inject("late", 5, |this| {
                this.record("late");
                Ok(())
            })
            .post_inject("early", -1, |this| {
                this.record("early");
                Ok(())
            });
    }
}

static STARTED: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

struct Alpha {
    beta: Slot<Beta>,
}

struct Beta {
    alpha: Slot<Alpha>,
}

impl Injectable for Alpha {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| Ok(Alpha { beta: Slot::empty() })))
            .field(Field::new("beta", |this: &Self| &this.beta))
            .post_inject("start", 10, |this| {
                assert!(this.beta.is_set());
                STARTED.lock().unwrap().push("alpha");
                Ok(())
            })
            .post_inject("warm_up", 0, |_| {
                STARTED.lock().unwrap().push("alpha-warm-up");
                Ok(())
            });
    }
}

impl Injectable for Beta {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| Ok(Beta { alpha: Slot::empty() })))
            .field(Field::new("alpha", |this: &Self| &this.alpha))
            .post_inject("start", -5, |this| {
                assert!(this.alpha.is_set());
                STARTED.lock().unwrap().push("beta");
                Ok(())
            });
    }
}

static DESTROYED: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

struct Database;

impl Injectable for Database {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| Ok(Database)))
            .pre_destroy("close", 0, |_| {
                DESTROYED.lock().unwrap().push("database");
                Ok(())
            });
    }
}

struct Repository {
    database: Slot<Database>,
}

impl Injectable for Repository {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| Ok(Repository { database: Slot::empty() })))
            .field(Field::new("database", |this: &Self| &this.database))
            .pre_destroy("flush", 1, |_| {
                DESTROYED.lock().unwrap().push("repository:flush");
                Ok(())
            })
            .pre_destroy("close", 0, |_| {
                DESTROYED.lock().unwrap().push("repository:close");
                Ok(())
            });
    }
}

static WORKERS_DESTROYED: AtomicU8 = AtomicU8::new(0);

struct Worker;

impl Injectable for Worker {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| Ok(Worker)))
            .pre_destroy("stop", 0, |_| {
                WORKERS_DESTROYED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }
}

struct Faulty;

impl Injectable for Faulty {
    fn describe(class: &mut ClassBuilder<Self>) {
        class.constructor(Constructor::new("new", |_| {
            Err::<Faulty, InstantiateErrorKind>(anyhow::anyhow!("port in use").into())
        }));
    }
}

static PLUGINS_STARTED: AtomicU8 = AtomicU8::new(0);

struct Plugin {
    engine: Slot<Engine>,
}

impl Injectable for Plugin {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| Ok(Plugin { engine: Slot::empty() })))
            .field(Field::new("engine", |this: &Self| &this.engine))
            .post_inject("start", 0, |_| {
                PLUGINS_STARTED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }
}

#[test]
#[traced_test]
fn test_lifecycle_order() {
    let injector = Injector::new(&[]).unwrap();

    let service = injector.get::<Service>().unwrap();
    assert_eq!(
        *service.events.lock(),
        [
            "constructor",
            "prepare(engine set: false)",
            "configure(engine set: true)",
            "early",
            "late",
        ]
    );
}

#[test]
#[traced_test]
fn test_eager_singletons_reference_each_other() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<Alpha>().to_eager_singleton();
        binder.bind::<Beta>().to_eager_singleton();
    }])
    .unwrap();

    assert_eq!(*STARTED.lock().unwrap(), ["beta", "alpha-warm-up", "alpha"]);

    let alpha = injector.get::<Alpha>().unwrap();
    let beta = injector.get::<Beta>().unwrap();
    assert!(Arc::ptr_eq(&alpha.beta.get().unwrap(), &beta));
    assert!(Arc::ptr_eq(&beta.alpha.get().unwrap(), &alpha));
    assert_eq!(STARTED.lock().unwrap().len(), 3);
}

#[test]
#[traced_test]
fn test_eager_failure_fails_build() {
    let err = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<Faulty>().to_eager_singleton();
    }])
    .unwrap_err();

    assert!(matches!(
        err,
        ResolveErrorKind::Provision(ProvisionErrorKind::Constructor { .. })
    ));
}

#[test]
#[traced_test]
fn test_destroy_in_reverse_creation_order() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<Database>().to_singleton();
        binder.bind::<Repository>().to_singleton();
    }])
    .unwrap();

    let repository = injector.get::<Repository>().unwrap();
    assert!(repository.database.is_set());

    injector.destroy().unwrap();
    assert_eq!(
        *DESTROYED.lock().unwrap(),
        ["repository:close", "repository:flush", "database"]
    );

    injector.destroy().unwrap();
    assert_eq!(DESTROYED.lock().unwrap().len(), 3);
}

#[test]
#[traced_test]
fn test_child_injector() {
    let parent = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<String>().to_immutable_instance(Arc::new("parent".to_owned()));
    }])
    .unwrap();

    let child = parent
        .child(&[&|binder: &mut Binder| {
            binder.bind::<String>().to_immutable_instance(Arc::new("child".to_owned()));
            binder.bind::<Worker>().to_eager_singleton();
        }])
        .unwrap();

    assert_eq!(*child.get::<String>().unwrap(), "child");
    assert_eq!(*parent.get::<String>().unwrap(), "parent");
    assert!(Arc::ptr_eq(&child.get::<Worker>().unwrap(), &child.get::<Worker>().unwrap()));
    assert_eq!(*child.parent().unwrap().get::<String>().unwrap(), "parent");

    child.destroy().unwrap();
    assert_eq!(WORKERS_DESTROYED.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_instance_members_injected_once() {
    let plugin = Arc::new(Plugin { engine: Slot::empty() });
    let bound = plugin.clone();

    let injector = Injector::new(&[&move |binder: &mut Binder| {
        binder.bind::<Plugin>().to_instance(bound.clone());
    }])
    .unwrap();

    let first = injector.get::<Plugin>().unwrap();
    let second = injector.get::<Plugin>().unwrap();
    assert!(Arc::ptr_eq(&first, &plugin));
    assert!(Arc::ptr_eq(&second, &plugin));
    assert!(plugin.engine.is_set());
    assert_eq!(PLUGINS_STARTED.load(Ordering::SeqCst), 1);
}
