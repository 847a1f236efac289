use std::sync::Arc;
use std::time::Duration;

use nova_breakpoints::{BreakpointEvent, DebugSession, MemoryBreakpointStore, SessionListener};
use nova_config::DebuggerConfig;
use nova_jdwp::{MockClass, MockVm};
use parking_lot::Mutex;

#[derive(Clone, Default)]
struct SuspendCounter(Arc<Mutex<usize>>);

impl SessionListener for SuspendCounter {
    fn suspended(&mut self) {
        *self.0.lock() += 1;
    }
}

fn session() -> DebugSession {
    DebugSession::with_store(
        "loop",
        Arc::new(MemoryBreakpointStore::new()),
        &DebuggerConfig::default(),
    )
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn loop_resumes_non_stopping_hits_and_reports_stops() {
    let vm = Arc::new(MockVm::new());
    vm.load_class(
        MockClass::new(1, "com.x.Y")
            .method(2, "quiet", &[], Some(10))
            .method(3, "loud", &[], Some(20)),
    );
    let counter = SuspendCounter::default();
    let mut s = session();
    s.add_listener(Box::new(counter.clone()));
    s.connect(vm.clone(), vm.subscribe_events()).await;

    let quiet = s.factory().parse_command("go com.x.Y:10", None).unwrap();
    let loud = s.factory().create_line("com.x.Y", 20).unwrap();
    let (quiet, loud) = {
        let mut manager = s.manager().lock();
        (manager.add_breakpoint(quiet), manager.add_breakpoint(loud))
    };
    let mut rx = s.manager().lock().subscribe();
    let request_of = |id| s.manager().lock().breakpoint(id).unwrap().requests()[0];

    assert!(vm.emit(vm.breakpoint_hit(request_of(quiet), 1).unwrap()));
    wait_for(|| vm.resume_calls() == 1).await;

    assert!(vm.emit(vm.breakpoint_hit(request_of(loud), 1).unwrap()));
    // Non-suspending hits publish `Stopped` too; wait for the loud one.
    loop {
        match rx.recv().await.unwrap() {
            BreakpointEvent::Stopped { breakpoint, .. } if breakpoint == loud => break,
            _ => continue,
        }
    }
    wait_for(|| *counter.0.lock() == 1).await;
    assert_eq!(vm.resume_calls(), 1, "stopping hits leave the VM suspended");

    s.resume().unwrap();
    assert_eq!(vm.resume_calls(), 2);
    s.close().await;
}

#[tokio::test]
async fn cancelled_loop_stops_listening() {
    let vm = Arc::new(MockVm::new());
    let mut s = session();
    s.connect(vm.clone(), vm.subscribe_events()).await;
    s.disconnect().await;

    // The loop owned the only receiver.
    assert!(!vm.emit(nova_jdwp::JdwpEvent::VmDisconnected));
    assert!(!s.is_connected());
    assert!(s.resume().is_err());
}

#[tokio::test]
async fn events_for_unknown_requests_are_resumed() {
    let vm = Arc::new(MockVm::new());
    let mut s = session();
    s.connect(vm.clone(), vm.subscribe_events()).await;

    assert!(vm.emit(nova_jdwp::JdwpEvent::ThreadStart {
        request_id: nova_jdwp::RequestId(404),
        thread: 1,
    }));
    wait_for(|| vm.resume_calls() == 1).await;
    s.close().await;
}
