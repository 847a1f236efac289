use std::sync::Arc;

use nova_breakpoints::{
    BreakpointFactory, BreakpointGroup, Monitor, StackTraceMonitor, props,
};
use nova_jdwp::{EventKind, MockClass, MockVm, SuspendPolicy};

use super::support::{drain, manager, property_changes};

#[test]
fn effective_enablement_follows_the_group_chain() {
    let mut m = manager();
    let outer = m
        .add_group(m.default_group(), BreakpointGroup::new("outer").unwrap())
        .unwrap();
    let inner = m
        .add_group(outer, BreakpointGroup::new("inner").unwrap())
        .unwrap();
    let bp = BreakpointFactory::default().create_line("com.x.Y", 10).unwrap();
    let id = m.add_breakpoint_to(inner, bp).unwrap();
    assert!(m.is_enabled(id));

    m.set_group_enabled(outer, false).unwrap();
    assert!(!m.is_enabled(id));
    assert!(m.breakpoint(id).unwrap().enabled(), "own flag is untouched");
    assert!(!m.is_group_enabled(inner));

    m.set_group_enabled(outer, true).unwrap();
    assert!(m.is_enabled(id));

    m.set_enabled(id, false).unwrap();
    assert!(!m.is_enabled(id));
}

#[test]
fn disabling_an_ancestor_tears_down_requests() {
    let vm = Arc::new(MockVm::new());
    vm.load_class(MockClass::new(1, "com.x.Y").method(2, "run", &[], Some(10)));
    let mut m = manager();
    m.attach(vm.clone());
    let group = m
        .add_group(m.default_group(), BreakpointGroup::new("g").unwrap())
        .unwrap();
    let bp = BreakpointFactory::default().create_line("com.x.Y", 10).unwrap();
    let id = m.add_breakpoint_to(group, bp).unwrap();
    assert!(!vm.requests_of_kind(EventKind::Breakpoint).is_empty());

    m.set_group_enabled(group, false).unwrap();
    assert!(vm.requests().is_empty(), "{:?}", vm.requests());
    assert!(!m.breakpoint(id).unwrap().is_resolved());

    m.set_group_enabled(group, true).unwrap();
    assert_eq!(vm.requests_of_kind(EventKind::Breakpoint).len(), 1);
    assert!(m.breakpoint(id).unwrap().is_resolved());
}

#[test]
fn thread_requiring_monitor_forces_suspend_all_on_requests() {
    let vm = Arc::new(MockVm::new());
    let mut m = manager();
    m.attach(vm.clone());
    let id = m.add_breakpoint(BreakpointFactory::default().create_thread(true, false));
    m.set_suspend_policy(id, SuspendPolicy::None).unwrap();
    let request = m.breakpoint(id).unwrap().requests()[0];
    assert_eq!(vm.request(request).unwrap().suspend_policy, SuspendPolicy::None);

    let monitor: Arc<dyn Monitor> = Arc::new(StackTraceMonitor);
    m.add_monitor(id, monitor.clone()).unwrap();
    let request = m.breakpoint(id).unwrap().requests()[0];
    assert_eq!(vm.request(request).unwrap().suspend_policy, SuspendPolicy::All);
    assert_eq!(m.breakpoint(id).unwrap().suspend_policy(), SuspendPolicy::None);

    m.remove_monitor(id, &monitor).unwrap();
    m.set_suspend_policy(id, SuspendPolicy::None).unwrap();
    let request = m.breakpoint(id).unwrap().requests()[0];
    assert_eq!(vm.request(request).unwrap().suspend_policy, SuspendPolicy::None);
}

#[test]
fn hit_count_counts_only_enabled_deliveries() {
    let vm = Arc::new(MockVm::new());
    vm.load_class(MockClass::new(1, "com.x.Y").method(2, "run", &[], Some(10)));
    let mut m = manager();
    m.attach(vm.clone());
    let id = m.add_breakpoint(BreakpointFactory::default().create_line("com.x.Y", 10).unwrap());
    let request = m.breakpoint(id).unwrap().requests()[0];
    let hit = vm.breakpoint_hit(request, 1).unwrap();
    let mut rx = m.subscribe();

    for _ in 0..3 {
        m.dispatch(&hit);
    }
    assert_eq!(m.breakpoint(id).unwrap().hit_count(), 3);
    assert_eq!(property_changes(&drain(&mut rx), props::HIT_COUNT).count(), 3);

    m.set_group_enabled(m.default_group(), false).unwrap();
    for _ in 0..3 {
        assert!(m.dispatch(&hit));
    }
    assert_eq!(m.breakpoint(id).unwrap().hit_count(), 3);

    m.reset(id).unwrap();
    m.reset(id).unwrap();
    assert_eq!(m.breakpoint(id).unwrap().hit_count(), 0);
    let published = drain(&mut rx);
    let resets: Vec<_> = property_changes(&published, props::HIT_COUNT).collect();
    assert_eq!(resets.len(), 1, "second reset changes nothing");
}
