use std::sync::Arc;

use nova_breakpoints::{BreakpointEvent, BreakpointFactory};
use nova_jdwp::{EventKind, MockClass, MockVm, ObjectRef, VirtualMachine};

use super::support::{drain, manager};

#[test]
fn instance_watch_is_dropped_quietly_when_the_debuggee_dies() {
    let vm = Arc::new(MockVm::new());
    vm.load_class(
        MockClass::new(1, "com.x.Counter")
            .field(4, "count", "int")
            .method(2, "tick", &[], Some(10)),
    );
    let mut m = manager();
    m.attach(vm.clone());
    let factory = BreakpointFactory::default();

    let line = m.add_breakpoint(factory.create_line("com.x.Counter", 10).unwrap());
    let field = vm.fields(1).unwrap().remove(0);
    let object = ObjectRef {
        id: 99,
        runtime_type: "com.x.Counter".into(),
    };
    let watch = m.add_breakpoint(factory.create_instance_watch(field, object, false, true));
    assert_eq!(vm.requests_of_kind(EventKind::FieldModification).len(), 1);

    let hit = vm
        .breakpoint_hit(m.breakpoint(line).unwrap().requests()[0], 1)
        .unwrap();
    m.dispatch(&hit);
    m.dispatch(&hit);
    assert_eq!(m.breakpoint(line).unwrap().hit_count(), 2);

    let mut rx = m.subscribe();
    vm.disconnect();
    m.detach();

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        BreakpointEvent::Removed { breakpoint, .. } if *breakpoint == watch
    )));
    assert!(
        !events.iter().any(|e| matches!(
            e,
            BreakpointEvent::Error { .. } | BreakpointEvent::GroupError { .. }
        )),
        "teardown against a dead VM is not a fault: {events:?}"
    );
    assert!(m.breakpoint(watch).is_none());

    let survivor = m.breakpoint(line).expect("line breakpoints survive a disconnect");
    assert_eq!(survivor.hit_count(), 0);
    assert!(survivor.requests().is_empty());
    assert!(survivor.prepare_request().is_none());
    assert!(!survivor.is_resolved());
    assert!(!m.is_connected());
}

#[test]
fn reattaching_resolves_surviving_breakpoints_again() {
    let first = Arc::new(MockVm::new());
    first.load_class(MockClass::new(1, "com.x.Y").method(2, "run", &[], Some(10)));
    let mut m = manager();
    m.attach(first.clone());
    let id = m.add_breakpoint(BreakpointFactory::default().create_line("com.x.Y", 10).unwrap());
    assert!(m.breakpoint(id).unwrap().is_resolved());
    m.detach();
    assert!(
        first.requests().is_empty(),
        "requests are deleted while the VM still answers"
    );

    let second = Arc::new(MockVm::new());
    m.attach(second.clone());
    assert!(!m.breakpoint(id).unwrap().is_resolved());
    for event in second.load_class(MockClass::new(5, "com.x.Y").method(6, "run", &[], Some(10))) {
        m.dispatch(&event);
    }
    let bp = m.breakpoint(id).unwrap();
    assert!(bp.is_resolved());
    let request = second.request(bp.requests()[0]).unwrap();
    assert_eq!(request.location().unwrap().class_id, 5);
}
