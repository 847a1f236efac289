use std::sync::Arc;

use nova_breakpoints::{
    BreakpointEvent, BreakpointFactory, ClassPattern, EventSource, Fault, ResolveError, props,
};
use nova_jdwp::{EventKind, EventModifier, MockClass, MockVm};
use serde_json::json;

use super::support::{drain, manager, property_changes};

#[test]
fn wildcard_patterns() {
    let suffix = ClassPattern::parse("*Foo").unwrap();
    assert!(suffix.matches("a.b.Foo"));
    assert!(suffix.matches("Foo"));
    assert!(!suffix.matches("Foobar"));

    let prefix = ClassPattern::parse("Foo*").unwrap();
    assert!(prefix.matches("Foobar"));
    assert!(!prefix.matches("xFoo"));

    let exact = ClassPattern::parse("Foo").unwrap();
    assert!(exact.matches("Foo"));
    assert!(!exact.matches("a.Foo"));
    assert!(!exact.matches("Foobar"));
}

#[test]
fn wildcard_breakpoint_resolves_in_every_matching_class() {
    let vm = Arc::new(MockVm::new());
    for (id, name) in [(1, "a.b.Foo"), (2, "Foo"), (3, "Foobar")] {
        vm.load_class(MockClass::new(id, name).method(10, "run", &[], Some(5)));
    }
    let mut m = manager();
    m.attach(vm.clone());
    let bp = BreakpointFactory::default().create_line("*Foo", 5).unwrap();
    let id = m.add_breakpoint(bp);

    let classes: Vec<u64> = m
        .breakpoint(id)
        .unwrap()
        .requests()
        .iter()
        .map(|r| vm.request(*r).unwrap().location().unwrap().class_id)
        .collect();
    assert_eq!(classes, vec![1, 2]);
}

#[test]
fn resolves_once_when_the_class_is_prepared() {
    let vm = Arc::new(MockVm::new());
    let mut m = manager();
    m.attach(vm.clone());
    let id = m.add_breakpoint(BreakpointFactory::default().create_line("com.x.Y", 42).unwrap());
    let bp = m.breakpoint(id).unwrap();
    assert!(!bp.is_resolved());
    let prepare = bp.prepare_request().expect("class-prepare watch installed");
    assert_eq!(vm.request(prepare).unwrap().kind, EventKind::ClassPrepare);

    let mut rx = m.subscribe();
    let events = vm.load_class(
        MockClass::new(7, "com.x.Y")
            .source_path("com/x/Y.java")
            .method(3, "run", &[], Some(42)),
    );
    assert_eq!(events.len(), 1);
    assert!(m.dispatch(&events[0]), "class-prepare never suspends");
    // A second loader defining an unrelated class changes nothing.
    for event in vm.load_class(MockClass::new(8, "com.x.Z")) {
        m.dispatch(&event);
    }

    assert!(m.breakpoint(id).unwrap().is_resolved());
    let published = drain(&mut rx);
    let resolved: Vec<_> = property_changes(&published, props::RESOLVED).collect();
    assert_eq!(resolved.len(), 1);
    let BreakpointEvent::PropertyChanged(change) = resolved[0] else {
        unreachable!();
    };
    assert_eq!(change.source, EventSource::Breakpoint(id));
    assert_eq!((change.old.clone(), change.new.clone()), (json!(false), json!(true)));
    assert_eq!(m.breakpoint(id).unwrap().hit_count(), 0);
}

#[test]
fn missing_method_is_reported_and_retried_later() {
    let vm = Arc::new(MockVm::new());
    vm.load_class(MockClass::new(1, "com.x.Y").method(2, "other", &[], Some(3)));
    let mut m = manager();
    m.attach(vm.clone());
    let mut rx = m.subscribe();

    let bp = BreakpointFactory::default()
        .create_method("com.x.*", "run", Vec::new())
        .unwrap();
    let id = m.add_breakpoint(bp);
    let errors: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            BreakpointEvent::Error { breakpoint, error } if breakpoint == id => Some(error),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &*errors[0],
        Fault::Resolve(ResolveError::NoSuchMethod { method, .. }) if method == "run"
    ));
    assert!(!m.breakpoint(id).unwrap().is_resolved());

    for event in vm.load_class(MockClass::new(2, "com.x.Z").method(4, "run", &[], Some(9))) {
        m.dispatch(&event);
    }
    assert!(m.breakpoint(id).unwrap().is_resolved());
}

#[test]
fn overloads_need_parameter_types() {
    let vm = Arc::new(MockVm::new());
    vm.load_class(
        MockClass::new(1, "java.lang.String")
            .method(1, "valueOf", &["int"], Some(10))
            .method(2, "valueOf", &["char[]"], Some(20)),
    );
    let mut m = manager();
    m.attach(vm.clone());
    let factory = BreakpointFactory::default();

    let all = m.add_breakpoint(factory.create_breakpoint("java.lang.String:valueOf", None).unwrap());
    assert_eq!(m.breakpoint(all).unwrap().requests().len(), 2);

    let one = m.add_breakpoint(
        factory
            .create_breakpoint("java.lang.String:valueOf(int)", None)
            .unwrap(),
    );
    let requests = m.breakpoint(one).unwrap().requests().to_vec();
    assert_eq!(requests.len(), 1);
    assert_eq!(vm.request(requests[0]).unwrap().location().unwrap().method_id, 1);
}

#[test]
fn class_line_resolves_when_the_source_file_is_named_differently() {
    let helper = || {
        MockClass::new(3, "pkg.Helper")
            .source_path("pkg/Main.java")
            .method(4, "help", &[], Some(10))
    };
    let factory = BreakpointFactory::default();

    let loaded = Arc::new(MockVm::new());
    loaded.load_class(helper());
    let mut m = manager();
    m.attach(loaded.clone());
    let eager = m.add_breakpoint(factory.create_breakpoint("pkg.Helper:10", None).unwrap());
    assert!(m.breakpoint(eager).unwrap().is_resolved());

    let pending = Arc::new(MockVm::new());
    let mut m = manager();
    m.attach(pending.clone());
    let lazy = m.add_breakpoint(factory.create_breakpoint("pkg.Helper:10", None).unwrap());
    let prepare = m.breakpoint(lazy).unwrap().prepare_request().unwrap();
    assert!(!pending
        .request(prepare)
        .unwrap()
        .modifiers
        .iter()
        .any(|modifier| matches!(modifier, EventModifier::SourceNameMatch { .. })));

    let events = pending.load_class(helper());
    assert_eq!(events.len(), 1);
    m.dispatch(&events[0]);
    let bp = m.breakpoint(lazy).unwrap();
    assert!(bp.is_resolved());
    assert_eq!(pending.request(bp.requests()[0]).unwrap().location().unwrap().class_id, 3);
}

#[test]
fn source_file_breakpoint_waits_for_its_own_file() {
    let vm = Arc::new(MockVm::new());
    let mut m = manager();
    m.attach(vm.clone());
    let id = m.add_breakpoint(
        BreakpointFactory::default()
            .create_source_line("/work/src/com/x/Y.java", Some("com.x"), 42)
            .unwrap(),
    );
    let prepare = m.breakpoint(id).unwrap().prepare_request().unwrap();
    assert!(vm.request(prepare).unwrap().modifiers.contains(&EventModifier::SourceNameMatch {
        pattern: "Y.java".into(),
    }));

    let other = vm.load_class(
        MockClass::new(1, "com.x.Z")
            .source_path("com/x/Z.java")
            .method(2, "run", &[], Some(42)),
    );
    assert!(other.is_empty(), "another file in the package is not reported");
    assert!(!m.breakpoint(id).unwrap().is_resolved());

    let own = vm.load_class(
        MockClass::new(5, "com.x.Y")
            .source_path("com/x/Y.java")
            .method(6, "run", &[], Some(42)),
    );
    assert_eq!(own.len(), 1);
    m.dispatch(&own[0]);
    let bp = m.breakpoint(id).unwrap();
    assert!(bp.is_resolved());
    assert_eq!(vm.request(bp.requests()[0]).unwrap().location().unwrap().class_id, 5);
}

#[test]
fn failed_install_leaves_no_requests_behind() {
    let vm = Arc::new(MockVm::new());
    vm.load_class(
        MockClass::new(1, "java.lang.String")
            .method(1, "valueOf", &["int"], Some(10))
            .method(2, "valueOf", &["long"], Some(20))
            .method(3, "valueOf", &["char[]"], Some(30)),
    );
    let mut m = manager();
    m.attach(vm.clone());
    let mut rx = m.subscribe();
    let factory = BreakpointFactory::default();

    // The class-prepare watch and two overloads fit; the third fails.
    vm.limit_requests(Some(3));
    let method = m.add_breakpoint(factory.create_breakpoint("java.lang.String:valueOf", None).unwrap());
    assert!(vm.requests_of_kind(EventKind::Breakpoint).is_empty());
    assert_eq!(vm.deleted_requests().len(), 2);
    assert!(m.breakpoint(method).unwrap().requests().is_empty());

    vm.limit_requests(Some(1));
    let trace = m.add_breakpoint(factory.create_trace(true, true));
    assert!(vm.requests_of_kind(EventKind::MethodEntry).is_empty());
    assert!(m.breakpoint(trace).unwrap().requests().is_empty());

    let failed: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            BreakpointEvent::Error { breakpoint, .. } => Some(breakpoint),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![method, trace]);
}
