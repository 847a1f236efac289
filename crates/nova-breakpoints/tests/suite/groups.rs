use std::sync::Arc;

use nova_breakpoints::{
    BeepMonitor, BreakpointEvent, BreakpointFactory, BreakpointGroup, BufferedOutput,
    HitCountKind,
};
use nova_jdwp::{MockClass, MockVm};

use super::support::{drain, manager};

fn loaded_vm() -> Arc<MockVm> {
    let vm = Arc::new(MockVm::new());
    vm.load_class(
        MockClass::new(1, "com.x.Y")
            .method(1, "a", &[], Some(10))
            .method(2, "b", &[], Some(20))
            .method(3, "c", &[], Some(30)),
    );
    vm
}

#[test]
fn group_condition_gates_from_the_third_hit() {
    let vm = loaded_vm();
    let mut m = manager();
    m.attach(vm.clone());
    let factory = BreakpointFactory::default();
    let group = m
        .add_group(m.default_group(), factory.create_group("counted").unwrap())
        .unwrap();
    m.add_group_condition(group, factory.create_hit_count_condition(HitCountKind::Greater, 2))
        .unwrap();
    let id = m
        .add_breakpoint_to(group, factory.create_line("com.x.Y", 10).unwrap())
        .unwrap();
    let request = m.breakpoint(id).unwrap().requests()[0];
    let hit = vm.breakpoint_hit(request, 1).unwrap();

    let resumes: Vec<bool> = (0..5).map(|_| m.dispatch(&hit)).collect();
    assert_eq!(resumes, vec![true, true, false, false, false]);
}

#[test]
fn ancestor_conditions_apply_too() {
    let vm = loaded_vm();
    let mut m = manager();
    m.attach(vm.clone());
    let factory = BreakpointFactory::default();
    m.add_group_condition(
        m.default_group(),
        factory.create_hit_count_condition(HitCountKind::MultipleOf, 2),
    )
    .unwrap();
    let child = m
        .add_group(m.default_group(), factory.create_group("child").unwrap())
        .unwrap();
    let id = m
        .add_breakpoint_to(child, factory.create_line("com.x.Y", 10).unwrap())
        .unwrap();
    let request = m.breakpoint(id).unwrap().requests()[0];
    let hit = vm.breakpoint_hit(request, 1).unwrap();

    let resumes: Vec<bool> = (0..4).map(|_| m.dispatch(&hit)).collect();
    assert_eq!(resumes, vec![true, false, true, false]);
}

#[test]
fn group_monitors_run_for_every_ancestor() {
    let vm = loaded_vm();
    let output = Arc::new(BufferedOutput::new());
    let mut m = manager();
    m.set_output(output.clone());
    m.attach(vm.clone());
    let factory = BreakpointFactory::default();
    let child = m
        .add_group(m.default_group(), factory.create_group("child").unwrap())
        .unwrap();
    m.add_group_monitor(child, Arc::new(BeepMonitor)).unwrap();
    m.add_group_monitor(m.default_group(), Arc::new(BeepMonitor))
        .unwrap();
    let id = m
        .add_breakpoint_to(child, factory.create_line("com.x.Y", 20).unwrap())
        .unwrap();
    let request = m.breakpoint(id).unwrap().requests()[0];

    m.dispatch(&vm.breakpoint_hit(request, 1).unwrap());
    assert_eq!(output.lines().len(), 2);
}

#[test]
fn removing_a_group_destroys_breakpoints_before_announcing_the_group() {
    let vm = loaded_vm();
    let mut m = manager();
    m.attach(vm.clone());
    let factory = BreakpointFactory::default();
    let top = m
        .add_group(m.default_group(), BreakpointGroup::new("top").unwrap())
        .unwrap();
    let left = m.add_group(top, BreakpointGroup::new("left").unwrap()).unwrap();
    let right = m.add_group(top, BreakpointGroup::new("right").unwrap()).unwrap();
    let ids = [
        m.add_breakpoint_to(top, factory.create_line("com.x.Y", 10).unwrap())
            .unwrap(),
        m.add_breakpoint_to(left, factory.create_line("com.x.Y", 20).unwrap())
            .unwrap(),
        m.add_breakpoint_to(right, factory.create_line("com.x.Y", 30).unwrap())
            .unwrap(),
    ];
    let live: Vec<_> = ids
        .iter()
        .flat_map(|id| m.breakpoint(*id).unwrap().requests().to_vec())
        .collect();
    assert_eq!(live.len(), 3);
    let mut rx = m.subscribe();

    m.remove_group(top).unwrap();

    let events = drain(&mut rx);
    let position = |pred: &dyn Fn(&BreakpointEvent) -> bool| {
        events.iter().position(|e| pred(e)).expect("event published")
    };
    let top_removed = position(&|e: &BreakpointEvent| matches!(e, BreakpointEvent::GroupRemoved { group, .. } if *group == top));
    for id in ids {
        let removed = position(&|e: &BreakpointEvent| matches!(e, BreakpointEvent::Removed { breakpoint, .. } if *breakpoint == id));
        assert!(removed < top_removed);
        assert!(m.breakpoint(id).is_none());
    }
    for group in [left, right] {
        let sub_removed = position(&|e: &BreakpointEvent| matches!(e, BreakpointEvent::GroupRemoved { group: g, .. } if *g == group));
        assert!(sub_removed < top_removed);
        assert!(m.group(group).is_none());
    }
    let deleted = vm.deleted_requests();
    assert!(live.iter().all(|r| deleted.contains(r)));
    assert!(vm.requests().is_empty());
    assert!(m.group(m.default_group()).unwrap().groups().is_empty());
}
