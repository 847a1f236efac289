use std::sync::Arc;

use nova_breakpoints::{
    blob_name, BreakpointEvent, BreakpointFactory, BreakpointManager, BreakpointStore,
    ExpressionMonitor, FileBreakpointStore, HitCountKind, MemoryBreakpointStore, PersistedKind,
    SessionListener, StackTraceMonitor,
};
use nova_jdwp::{FieldInfo, Location, ObjectRef, SuspendPolicy};
use serde_json::json;

use super::support::drain;

/// A tree exercising every persistable kind plus nested groups.
fn populate(m: &mut BreakpointManager) {
    let factory = BreakpointFactory::default();
    let root = m.default_group();
    m.add_group_condition(root, factory.create_hit_count_condition(HitCountKind::Greater, 1))
        .unwrap();

    let line = m.add_breakpoint(factory.create_line("com.x.Y", 42).unwrap());
    m.set_thread_filter(line, Some("main")).unwrap();
    m.add_condition(line, factory.create_expression_condition("i > 3").unwrap())
        .unwrap();
    m.add_monitor(line, Arc::new(ExpressionMonitor::new("i"))).unwrap();
    m.set_property(line, "note", json!("flaky")).unwrap();

    m.add_breakpoint(
        factory
            .create_source_line("/work/src/com/x/Z.java", Some("com.x"), 7)
            .unwrap(),
    );

    let tools = m
        .add_group(root, factory.create_group("tools").unwrap())
        .unwrap();
    m.set_group_enabled(tools, false).unwrap();
    let method = m
        .add_breakpoint_to(
            tools,
            factory
                .create_method("java.lang.String", "valueOf", vec!["int".into()])
                .unwrap(),
        )
        .unwrap();
    m.set_suspend_policy(method, SuspendPolicy::EventThread).unwrap();
    m.set_delete_on_hit(method, true).unwrap();

    let nested = m
        .add_group(tools, factory.create_group("nested").unwrap())
        .unwrap();
    let watch = m
        .add_breakpoint_to(nested, factory.create_watch("com.x.*", "count", false, true).unwrap())
        .unwrap();
    m.set_class_filter(watch, Some("com.x.Counter")).unwrap();
    m.add_monitor(watch, Arc::new(StackTraceMonitor)).unwrap();
    let exception = m
        .add_breakpoint_to(
            nested,
            factory
                .create_exception("java.io.IOException", true, false)
                .unwrap(),
        )
        .unwrap();
    m.set_enabled(exception, false).unwrap();

    m.add_breakpoint(factory.create_thread(true, true));
    m.add_breakpoint(factory.create_class(true, false));
    m.add_breakpoint(factory.create_trace(true, false));
    m.add_breakpoint(factory.create_uncaught());

    // Not persisted: they point at debuggee state.
    m.add_breakpoint(factory.create_location(Location {
        class_id: 1,
        method_id: 2,
        index: 3,
    }));
    m.add_breakpoint(factory.create_instance_watch(
        FieldInfo {
            field_id: 1,
            declaring_type: 2,
            name: "count".into(),
            type_name: "int".into(),
        },
        ObjectRef {
            id: 77,
            runtime_type: "com.x.Counter".into(),
        },
        true,
        true,
    ));
}

#[test]
fn round_trip_through_memory_store() {
    let store = Arc::new(MemoryBreakpointStore::new());
    let mut original = BreakpointManager::new("s", store.clone());
    populate(&mut original);
    original.save().unwrap();
    assert!(store.contents(&blob_name("s")).is_some());

    let mut restored = BreakpointManager::new("s", store);
    let mut rx = restored.subscribe();
    assert!(restored.load().unwrap());
    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, BreakpointEvent::GroupError { .. })));

    let before = original.to_persisted();
    let after = restored.to_persisted();
    assert_eq!(after, before);
    assert_eq!(after.groups[0].name, "tools");
    assert!(!after.groups[0].enabled);
    assert_eq!(after.groups[0].groups[0].breakpoints.len(), 2);
    assert!(after.breakpoints.iter().any(|bp| matches!(
        &bp.kind,
        PersistedKind::Line { url: Some(url), line: 7, .. } if url == "/work/src/com/x/Z.java"
    )));
    // Location and instance watch breakpoints stay behind.
    assert_eq!(original.breakpoints().count(), 11);
    assert_eq!(restored.breakpoints().count(), 9);
}

#[test]
fn round_trip_through_file_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(FileBreakpointStore::new(dir.path().join("breakpoints")));
    let mut original = BreakpointManager::new("workspace", store.clone());
    populate(&mut original);
    original.save()?;
    assert!(dir
        .path()
        .join("breakpoints")
        .join("workspace-breakpoints.json")
        .is_file());

    let mut restored = BreakpointManager::new("workspace", store.clone());
    assert!(restored.load()?);
    assert_eq!(restored.to_persisted(), original.to_persisted());

    restored.delete_store()?;
    assert_eq!(store.read(&blob_name("workspace"))?, None);
    let mut fresh = BreakpointManager::new("workspace", store);
    assert!(!fresh.load()?, "missing blob is a fresh session");
    Ok(())
}

#[test]
fn reopening_replaces_the_tree_instead_of_appending() {
    let store = Arc::new(MemoryBreakpointStore::new());
    let mut original = BreakpointManager::new("s", store.clone());
    populate(&mut original);
    original.save().unwrap();

    let mut reopened = BreakpointManager::new("s", store);
    reopened.opened();
    let first = reopened.to_persisted();
    reopened.opened();
    assert!(reopened.load().unwrap());

    assert_eq!(reopened.breakpoints().count(), 9);
    assert_eq!(reopened.subgroups(reopened.default_group(), true).len(), 2);
    assert_eq!(reopened.to_persisted(), first);
    assert_eq!(first, original.to_persisted());
}

#[test]
fn corrupt_store_is_an_error_not_a_panic() {
    let store = Arc::new(MemoryBreakpointStore::new());
    store.write(&blob_name("s"), "{ not json").unwrap();
    let mut m = BreakpointManager::new("s", store);
    assert!(m.load().is_err());
    assert_eq!(m.breakpoints().count(), 0);
}
