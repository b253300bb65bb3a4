use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use tincture::{
    scan::{rules, ClassEntry, ClassScanner as _, LinkedScanner, PackageScanOptions},
    scope::ScopeRegistration,
    Binder, BindingScope, Injector,
};
use tracing_test::traced_test;

mod app {
    use std::sync::atomic::Ordering;

    use tincture::{discoverable, scan::Marker, ClassBuilder, Constructor, Injectable};

    pub struct Plain;

    impl Injectable for Plain {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.constructor(Constructor::new("new", |_| Ok(Plain)));
        }
    }

    discoverable!(Plain);

    pub mod cache {
        use tincture::{discoverable, scan::Marker, ClassBuilder, Constructor, Injectable};

        pub struct SessionCache;

        impl Injectable for SessionCache {
            fn describe(class: &mut ClassBuilder<Self>) {
                class.constructor(Constructor::new("new", |_| Ok(SessionCache)));
            }
        }

        discoverable!(SessionCache => [Marker::singleton()]);
    }

    pub mod web {
        use tincture::{discoverable, scan::Marker, ClassBuilder, Constructor, Injectable};

        pub struct Handler;

        impl Injectable for Handler {
            fn describe(class: &mut ClassBuilder<Self>) {
                class.constructor(Constructor::new("new", |_| Ok(Handler)));
            }
        }

        discoverable!(Handler => [Marker::scope("RequestScoped"), Marker::annotation("Controller")]);

        pub struct Conversation;

        impl Injectable for Conversation {
            fn describe(class: &mut ClassBuilder<Self>) {
                class.constructor(Constructor::new("new", |_| Ok(Conversation)));
            }
        }

        discoverable!(Conversation => [Marker::named_scope("ConversationScoped", "conversation")]);
    }

    pub struct Pool;

    impl Injectable for Pool {
        fn describe(class: &mut ClassBuilder<Self>) {
            class.constructor(Constructor::new("new", |_| Ok(Pool))).pre_destroy("close", 0, |_| {
                super::POOLS_CLOSED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    }

    discoverable!(Pool => [Marker::annotation("Infrastructure")]);
}

static POOLS_CLOSED: AtomicU8 = AtomicU8::new(0);

fn app_path() -> String {
    format!("{}::app", module_path!())
}

fn bound(binder: &Binder) -> Vec<(&'static str, BindingScope)> {
    let mut bound: Vec<_> = binder
        .bindings()
        .iter()
        .map(|binding| (binding.key().type_info.short_name(), binding.key().scope.clone()))
        .collect();
    bound.sort_by_key(|(name, _)| *name);
    bound
}

#[test]
#[traced_test]
fn test_linked_scanner_finds_registered_classes() {
    let entries = LinkedScanner.scan(&app_path(), true);
    let names: Vec<_> = entries.iter().map(|entry| entry.type_info().short_name()).collect();
    assert_eq!(names, ["Plain", "Pool", "SessionCache", "Conversation", "Handler"]);

    let entries = LinkedScanner.scan(&app_path(), false);
    let names: Vec<_> = entries.iter().map(|entry| entry.type_info().short_name()).collect();
    assert_eq!(names, ["Plain", "Pool"]);
    assert!(entries[0].markers().is_empty());
    assert!(entries[1].is_annotated_with("Infrastructure"));
}

#[test]
#[traced_test]
fn test_scan_package_with_default_rules() {
    let mut binder = Binder::new();
    binder.scan_package(&app_path());

    assert_eq!(
        bound(&binder),
        [
            ("Conversation", BindingScope::named("conversation")),
            ("Handler", BindingScope::REQUEST),
            ("Pool", BindingScope::UNSCOPED),
            ("SessionCache", BindingScope::SINGLETON),
        ]
    );
}

#[test]
#[traced_test]
fn test_discovered_bindings_resolve() {
    let path = app_path();
    let module = move |binder: &mut Binder| {
        binder.scan_package(&path);
    };
    let injector = Injector::builder()
        .register_scope(BindingScope::named("conversation"), ScopeRegistration::state_backed())
        .module(&module)
        .build()
        .unwrap();
    assert_eq!(injector.bindings().len(), 4);

    let first = injector.get::<app::cache::SessionCache>().unwrap();
    assert!(Arc::ptr_eq(&first, &injector.get::<app::cache::SessionCache>().unwrap()));

    assert!(injector.get::<app::web::Handler>().is_err());
    let request = injector.open_request().unwrap();
    let handler = request.get::<app::web::Handler>().unwrap();
    assert!(Arc::ptr_eq(&handler, &request.get::<app::web::Handler>().unwrap()));

    // Unscoped values aren't tracked, destroying the injector leaves them alone
    injector.get::<app::Pool>().unwrap();
    injector.destroy().unwrap();
    assert_eq!(POOLS_CLOSED.load(Ordering::SeqCst), 0);
}

#[test]
#[traced_test]
fn test_custom_rules_and_filter() {
    let options = PackageScanOptions::new()
        .include_default_rules(false)
        .filter(|entry: &ClassEntry| entry.type_info().short_name() != "Conversation")
        .add_rule(rules::annotated_with("Controller", |binder: &mut Binder, entry: &ClassEntry| {
            entry.bind(binder, BindingScope::SINGLETON);
        }))
        .add_rule(rules::self_binding());

    let mut binder = Binder::new();
    binder.scan(&LinkedScanner, &app_path(), &options);

    assert_eq!(
        bound(&binder),
        [
            ("Handler", BindingScope::SINGLETON),
            ("Plain", BindingScope::UNSCOPED),
            ("Pool", BindingScope::UNSCOPED),
            ("SessionCache", BindingScope::UNSCOPED),
        ]
    );
}
