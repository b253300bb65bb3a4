use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use tincture::{
    scope::ScopeRegistration, Binder, BindingScope, ClassBuilder, ConfigurationErrorKind, Constructor, Injectable, Injector,
    ResolveErrorKind,
};
use tracing_test::traced_test;

static REQUESTS_CREATED: AtomicU8 = AtomicU8::new(0);
static REQUESTS_DESTROYED: AtomicU8 = AtomicU8::new(0);

struct RequestContext(u8);

impl Injectable for RequestContext {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| {
                Ok(RequestContext(REQUESTS_CREATED.fetch_add(1, Ordering::SeqCst)))
            }))
            .pre_destroy("release", 0, |_| {
                REQUESTS_DESTROYED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }
}

static CARTS_DESTROYED: AtomicU8 = AtomicU8::new(0);

struct Cart;

impl Injectable for Cart {
    fn describe(class: &mut ClassBuilder<Self>) {
        class.constructor(Constructor::new("new", |_| Ok(Cart)));
    }
}

#[derive(Debug)]
struct Topic;

impl Injectable for Topic {
    fn describe(class: &mut ClassBuilder<Self>) {
        class.constructor(Constructor::new("new", |_| Ok(Topic)));
    }
}

static BASKETS_CREATED: AtomicU8 = AtomicU8::new(0);
static BASKETS_DESTROYED: AtomicU8 = AtomicU8::new(0);

struct Basket;

impl Injectable for Basket {
    fn describe(class: &mut ClassBuilder<Self>) {
        class
            .constructor(Constructor::new("new", |_| {
                BASKETS_CREATED.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Ok(Basket)
            }))
            .pre_destroy("empty", 0, |_| {
                BASKETS_DESTROYED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }
}

static POOLS_CREATED: AtomicU8 = AtomicU8::new(0);

struct Pool;

impl Injectable for Pool {
    fn describe(class: &mut ClassBuilder<Self>) {
        class.constructor(Constructor::new("new", |_| {
            POOLS_CREATED.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(Pool)
        }));
    }
}

#[test]
#[traced_test]
fn test_request_scope() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<RequestContext>().to_request_scoped();
    }])
    .unwrap();

    assert!(matches!(
        injector.get::<RequestContext>(),
        Err(ResolveErrorKind::Configuration(ConfigurationErrorKind::ScopeNotActive { .. }))
    ));

    let request = injector.open_request().unwrap();
    let first = request.get::<RequestContext>().unwrap();
    let second = request.get::<RequestContext>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(request.active_scopes(), [BindingScope::REQUEST]);

    let other = injector.open_request().unwrap();
    let third = other.get::<RequestContext>().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_ne!(first.0, third.0);

    let nested = request.open_request().unwrap();
    let fourth = nested.get::<RequestContext>().unwrap();
    assert!(!Arc::ptr_eq(&first, &fourth));
    assert_eq!(nested.active_scopes().len(), 2);

    let destroyed = REQUESTS_DESTROYED.load(Ordering::SeqCst);
    nested.close().unwrap();
    assert_eq!(REQUESTS_DESTROYED.load(Ordering::SeqCst), destroyed + 1);

    request.close().unwrap();
    assert_eq!(REQUESTS_DESTROYED.load(Ordering::SeqCst), destroyed + 2);

    drop(other);
    assert_eq!(REQUESTS_DESTROYED.load(Ordering::SeqCst), destroyed + 3);
}

#[test]
#[traced_test]
fn test_session_scope() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder
            .bind::<Cart>()
            .session_scoped()
            .finalizer(|_: Arc<Cart>| {
                CARTS_DESTROYED.fetch_add(1, Ordering::SeqCst);
            })
            .to_self();
    }])
    .unwrap();

    assert!(matches!(
        injector.open_scope(BindingScope::SESSION, None),
        Err(ResolveErrorKind::Configuration(ConfigurationErrorKind::MissingScopeIdentifier { .. }))
    ));

    let alice = injector.open_session("alice").unwrap();
    let alice_again = injector.open_session("alice").unwrap();
    let bob = injector.open_session("bob").unwrap();

    let cart = alice.get::<Cart>().unwrap();
    assert!(Arc::ptr_eq(&cart, &alice_again.get::<Cart>().unwrap()));
    assert!(!Arc::ptr_eq(&cart, &bob.get::<Cart>().unwrap()));

    alice.close().unwrap();
    assert_eq!(CARTS_DESTROYED.load(Ordering::SeqCst), 0);

    alice_again.close().unwrap();
    assert_eq!(CARTS_DESTROYED.load(Ordering::SeqCst), 1);

    let alice = injector.open_session("alice").unwrap();
    assert!(!Arc::ptr_eq(&cart, &alice.get::<Cart>().unwrap()));

    injector.destroy().unwrap();
    assert_eq!(CARTS_DESTROYED.load(Ordering::SeqCst), 3);
}

#[test]
#[traced_test]
fn test_custom_scope() {
    let conversation = BindingScope::named("conversation");
    let scope = conversation.clone();
    let module = move |binder: &mut Binder| {
        binder.bind::<Topic>().in_scope(scope.clone()).to_self();
    };

    assert!(matches!(
        Injector::new(&[&module]),
        Err(ResolveErrorKind::Configuration(ConfigurationErrorKind::UnknownScope { .. }))
    ));

    let injector = Injector::builder()
        .register_scope(conversation.clone(), ScopeRegistration::state_backed())
        .module(&module)
        .build()
        .unwrap();

    assert!(injector.get::<Topic>().unwrap_err().to_string().contains("conversation"));

    let first = injector.open_scope(conversation.clone(), None).unwrap();
    let second = injector.open_scope(conversation, None).unwrap();
    let topic = first.get::<Topic>().unwrap();
    assert!(Arc::ptr_eq(&topic, &first.get::<Topic>().unwrap()));
    assert!(!Arc::ptr_eq(&topic, &second.get::<Topic>().unwrap()));

    assert!(matches!(
        injector.open_scope(BindingScope::SINGLETON, None),
        Err(ResolveErrorKind::Configuration(ConfigurationErrorKind::ScopeNotActivatable { .. }))
    ));
}

#[test]
#[traced_test]
fn test_child_sees_parent_activation() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<Cart>().to_request_scoped();
    }])
    .unwrap();

    let request = injector.open_request().unwrap();
    let child = request.child(&[]).unwrap();

    let from_child = child.get::<Cart>().unwrap();
    let from_request = request.get::<Cart>().unwrap();
    assert!(Arc::ptr_eq(&from_child, &from_request));
}

#[test]
#[traced_test]
fn test_singleton_across_threads() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<Pool>().to_singleton();
    }])
    .unwrap();

    let pools: Vec<Arc<Pool>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let injector = injector.clone();
                scope.spawn(move || injector.get::<Pool>().unwrap())
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(POOLS_CREATED.load(Ordering::SeqCst), 1);
    assert!(pools.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
#[traced_test]
fn test_session_across_threads() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<Basket>().to_session_scoped();
    }])
    .unwrap();

    let barrier = Barrier::new(8);
    let baskets: Vec<Arc<Basket>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let injector = injector.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    let session = injector.open_session("shared").unwrap();
                    barrier.wait();
                    let basket = session.get::<Basket>().unwrap();
                    barrier.wait();
                    basket
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(BASKETS_CREATED.load(Ordering::SeqCst), 1);
    assert!(baskets.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(BASKETS_DESTROYED.load(Ordering::SeqCst), 1);

    injector.destroy().unwrap();
    assert_eq!(BASKETS_DESTROYED.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_session_survives_nested_requests() {
    let injector = Injector::new(&[&|binder: &mut Binder| {
        binder.bind::<Cart>().named("session").to_session_scoped();
        binder.bind::<RequestContext>().to_request_scoped();
    }])
    .unwrap();

    let session = injector.open_session("carol").unwrap();
    let cart = session.get_named::<Cart>("session").unwrap();

    let first_request = session.open_request().unwrap();
    assert!(Arc::ptr_eq(&cart, &first_request.get_named::<Cart>("session").unwrap()));
    let first_context = first_request.get::<RequestContext>().unwrap();

    let nested = first_request.open_request().unwrap();
    assert!(Arc::ptr_eq(&cart, &nested.get_named::<Cart>("session").unwrap()));
    assert!(!Arc::ptr_eq(&first_context, &nested.get::<RequestContext>().unwrap()));
    nested.close().unwrap();
    first_request.close().unwrap();

    let second_request = session.open_request().unwrap();
    assert!(Arc::ptr_eq(&cart, &second_request.get_named::<Cart>("session").unwrap()));

    let from_thread = thread::scope(|scope| {
        let injector = injector.clone();
        scope
            .spawn(move || {
                let session = injector.open_session("carol").unwrap();
                session.get_named::<Cart>("session").unwrap()
            })
            .join()
            .unwrap()
    });
    assert!(Arc::ptr_eq(&cart, &from_thread));
}
