use mutandis::{Counters, MutationKind, Status, StatusScreen, Telemetry};
use std::sync::Arc;
use std::thread;

#[test]
fn statuses_fold_into_four_columns() {
    let screen = StatusScreen::new(100);
    let kind = MutationKind::CallMethod;
    screen.record(kind, Status::Success, 1);
    screen.record(kind, Status::Failed, 0);
    screen.record(kind, Status::NotExecuted, 0);
    screen.record(kind, Status::Crashed, 1);
    screen.record(kind, Status::Interrupted, 1);
    screen.record(kind, Status::Violates, 1);

    assert_eq!(
        screen.counters(kind),
        Counters {
            success: 1,
            failed: 2,
            crashed: 2,
            violations: 1,
        }
    );
    assert_eq!(screen.counters(MutationKind::AddUnit), Counters::default());
    assert_eq!(screen.executions(), 4);
}

#[test]
fn success_bumps_the_stack_size_until_overwritten() {
    let screen = StatusScreen::new(100);
    screen.record(MutationKind::AddField, Status::Success, 1);
    screen.record(MutationKind::AddField, Status::Success, 1);
    assert_eq!(screen.stack_size(), 2);
    screen.set_stack_size(0);
    assert_eq!(screen.stack_size(), 0);
}

#[test]
fn stall_needs_a_whole_window_without_accepts() {
    let screen = StatusScreen::new(3);
    screen.record(MutationKind::AddLocal, Status::Crashed, 1);
    screen.record(MutationKind::AddLocal, Status::Success, 1);
    screen.record(MutationKind::AddLocal, Status::Crashed, 1);
    assert!(!screen.is_stalled());

    for _ in 0..2 {
        screen.record(MutationKind::AddLocal, Status::Failed, 0);
        assert!(!screen.is_stalled());
    }
    screen.record(MutationKind::AddLocal, Status::Failed, 0);
    assert!(screen.is_stalled());
    // Reading clears the flag.
    assert!(!screen.is_stalled());
}

#[test]
fn snapshot_lists_kinds_in_first_seen_order() {
    let screen = StatusScreen::new(1);
    screen.record(MutationKind::CallMethod, Status::Violates, 1);
    screen.record(MutationKind::AddField, Status::Failed, 0);

    let snapshot = screen.render_snapshot();
    let call = snapshot.find("CallMethod").expect("call row");
    let field = snapshot.find("AddField").expect("field row");
    assert!(call < field);
    assert!(snapshot.contains("STALLED"));
    assert!(snapshot.contains("total execs"));
    assert!(snapshot.contains("0:00:0"));

    // The marker is shown once per stall.
    assert!(!screen.render_snapshot().contains("STALLED"));
}

#[test]
fn recording_from_several_threads() {
    let screen = Arc::new(StatusScreen::new(1000));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let screen = Arc::clone(&screen);
            thread::spawn(move || {
                for _ in 0..250 {
                    screen.record(MutationKind::AddMethod, Status::Success, 1);
                }
            })
        })
        .collect();
    let reporter = {
        let screen = Arc::clone(&screen);
        thread::spawn(move || {
            for _ in 0..10 {
                let _ = screen.render_snapshot();
            }
        })
    };
    for worker in workers {
        worker.join().expect("worker");
    }
    reporter.join().expect("reporter");

    assert_eq!(screen.counters(MutationKind::AddMethod).success, 1000);
    assert_eq!(screen.executions(), 1000);
}
