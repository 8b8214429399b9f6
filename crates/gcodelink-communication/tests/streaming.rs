use gcodelink_communication::{SessionController, SimulatedTransport, SimulatorConfig};
use gcodelink_core::{
    ControllerError, ControllerEvent, ControllerState, Error, MachineStatus, Position,
    SessionConfig, StreamOutcome,
};
use std::sync::Arc;
use std::time::Duration;

fn program(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

async fn connect(sim: SimulatorConfig, config: SessionConfig) -> (SessionController, SimulatedTransport) {
    let transport = SimulatedTransport::new(sim);
    let controller = SessionController::new(Arc::new(transport.clone()), config);
    controller.connect("sim").await.unwrap();
    (controller, transport)
}

async fn wait_for_lines(transport: &SimulatedTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.journal().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_program_runs_to_completion() {
    let (controller, transport) =
        connect(SimulatorConfig::default(), SessionConfig::default().without_polling()).await;
    let mut events = controller.subscribe_events();

    let lines = program(&["G1 X10 Y10 F1000", "G1 X50", "G1 Y50"]);
    let handle = controller.stream_program(lines.clone()).await.unwrap();
    let report = handle.wait().await;

    assert_eq!(report.outcome, StreamOutcome::Completed);
    assert_eq!(report.completed, 3);
    assert_eq!(report.progress(), 100.0);
    assert_eq!(handle.progress(), 100.0);
    assert_eq!(controller.current_status().wpos, Position::new(50.0, 50.0, 0.0));
    assert_eq!(transport.received_lines(), lines);

    let path = controller.visualize(&lines, controller.current_status().wpos);
    let points: Vec<(f64, f64)> = path
        .waypoints
        .iter()
        .map(|w| (w.position.x, w.position.y))
        .collect();
    assert_eq!(points, vec![(10.0, 10.0), (50.0, 10.0), (50.0, 50.0)]);

    let mut last_percent = 0.0;
    loop {
        match events.recv().await.unwrap() {
            ControllerEvent::StreamProgress { percent, .. } => last_percent = percent,
            ControllerEvent::StreamFinished(outcome) => {
                assert!(outcome.is_completed());
                break;
            }
            _ => {}
        }
    }
    assert_eq!(last_percent, 100.0);
}

#[tokio::test]
async fn test_next_line_waits_for_response() {
    let sim = SimulatorConfig::default().with_ack_delay(Duration::from_millis(20));
    let (controller, transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let handle = controller
        .stream_program(program(&["G0 X1", "G0 X2", "G0 X3", "G0 X4", "G0 X5"]))
        .await
        .unwrap();
    assert!(handle.wait().await.outcome.is_completed());

    let journal = transport.journal();
    assert_eq!(journal.len(), 5);
    for pair in journal.windows(2) {
        let answered = pair[0].answered_at.expect("line answered");
        assert!(pair[1].received_at >= answered);
    }
}

#[tokio::test]
async fn test_blank_and_comment_lines_are_skipped() {
    let (controller, transport) =
        connect(SimulatorConfig::default(), SessionConfig::default().without_polling()).await;

    let handle = controller
        .stream_program(program(&["(setup)", "", "G0 X1 ; rapid", "   ", "G0 X2"]))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert!(report.outcome.is_completed());
    assert_eq!(report.completed, 5);
    assert_eq!(transport.received_lines(), vec!["G0 X1 ; rapid", "G0 X2"]);
}

#[tokio::test]
async fn test_cancel_after_third_line() {
    let sim = SimulatorConfig::default().with_ack_delay(Duration::from_millis(100));
    let (controller, transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let lines: Vec<String> = (1..=10).map(|i| format!("G1 X{} F500", i)).collect();
    let handle = controller.stream_program(lines).await.unwrap();

    wait_for_lines(&transport, 3).await;
    assert!(controller.cancel_stream());

    let report = handle.wait().await;
    assert_eq!(report.outcome, StreamOutcome::Cancelled { completed: 3 });
    assert_eq!(report.progress(), 30.0);
    assert_eq!(handle.progress(), 30.0);
    assert_eq!(transport.journal().len(), 3);
    assert!(controller.is_connected());
}

#[tokio::test]
async fn test_rejection_ends_stream_without_alarm() {
    let sim = SimulatorConfig::default().reject("X5 Y1", 20);
    let (controller, transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let handle = controller
        .stream_program(program(&[
            "G1 X1 F500",
            "G1 X2",
            "G1 X3",
            "G1 X4",
            "G1 X5 Y1",
            "G1 X6",
        ]))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert_eq!(
        report.outcome,
        StreamOutcome::Failed {
            line_number: 5,
            line: "G1 X5 Y1".to_string(),
            message: "error:20".to_string(),
        }
    );
    assert_eq!(report.completed, 4);
    assert_eq!(transport.journal().len(), 5);
    assert_ne!(controller.current_status().state, ControllerState::Alarm);
    assert!(controller.is_connected());
}

#[tokio::test]
async fn test_nonfatal_errors_can_be_skipped() {
    let sim = SimulatorConfig::default().reject("X2", 20);
    let config = SessionConfig {
        continue_on_nonfatal_error: true,
        ..SessionConfig::default().without_polling()
    };
    let (controller, transport) = connect(sim, config).await;

    let handle = controller
        .stream_program(program(&["G0 X1", "G0 X2", "G0 X3"]))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert!(report.outcome.is_completed());
    assert_eq!(transport.journal().len(), 3);
    assert_eq!(controller.current_status().wpos.x, 3.0);
}

#[tokio::test]
async fn test_alarm_ends_stream_and_locks_motion() {
    let sim = SimulatorConfig::default().alarm_on("X3", 1);
    let (controller, transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let handle = controller
        .stream_program(program(&["G0 X1", "G0 X2", "G0 X3", "G0 X4"]))
        .await
        .unwrap();
    let report = handle.wait().await;

    match report.outcome {
        StreamOutcome::Failed { line_number, .. } => assert_eq!(line_number, 3),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(controller.current_status().state, ControllerState::Alarm);
    assert_eq!(transport.journal().len(), 3);

    let err = controller.send_command("G0 X0").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Controller(ControllerError::AlarmLocked)
    ));
    assert_eq!(transport.journal().len(), 3);

    // A new stream fails before sending anything
    let report = controller
        .stream_program(program(&["G0 X0"]))
        .await
        .unwrap()
        .wait()
        .await;
    assert!(matches!(report.outcome, StreamOutcome::Failed { line_number: 1, .. }));
    assert_eq!(transport.journal().len(), 3);

    controller.unlock().await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Idle);
    controller.send_command("G0 X0").await.unwrap();
}

#[tokio::test]
async fn test_disconnect_aborts_stream() {
    let sim = SimulatorConfig::default().with_ack_delay(Duration::from_millis(50));
    let (controller, transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let lines: Vec<String> = (1..=10).map(|i| format!("G0 X{}", i)).collect();
    let handle = controller.stream_program(lines).await.unwrap();

    wait_for_lines(&transport, 2).await;
    controller.disconnect().await.unwrap();

    let report = handle.wait().await;
    assert_eq!(
        report.outcome,
        StreamOutcome::Aborted {
            reason: "disconnected".to_string()
        }
    );
    assert!(report.completed < 10);
    assert_eq!(controller.current_status(), MachineStatus::default());
    assert!(!controller.is_connected());
}

#[tokio::test]
async fn test_link_loss_aborts_stream() {
    let sim = SimulatorConfig::default().disconnect_after(2);
    let (controller, _transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let handle = controller
        .stream_program(program(&["G0 X1", "G0 X2", "G0 X3", "G0 X4"]))
        .await
        .unwrap();
    let report = handle.wait().await;

    assert!(matches!(report.outcome, StreamOutcome::Aborted { .. }));
    assert_eq!(report.completed, 2);
    assert_eq!(report.progress(), 50.0);
    assert_eq!(controller.current_status().state, ControllerState::Disconnected);
    assert_eq!(controller.current_status().wpos, Position::ZERO);
}

#[tokio::test]
async fn test_only_one_stream_at_a_time() {
    let sim = SimulatorConfig::default().with_ack_delay(Duration::from_millis(50));
    let (controller, _transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let lines = program(&["G0 X1", "G0 X2", "G0 X3", "G0 X4"]);
    let first = controller.stream_program(lines.clone()).await.unwrap();

    let err = controller.stream_program(lines.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Controller(ControllerError::StreamActive)));

    first.cancel();
    first.wait().await;

    let second = controller.stream_program(program(&["G0 X0"])).await.unwrap();
    assert!(second.wait().await.outcome.is_completed());
}

#[tokio::test]
async fn test_missing_acknowledgement_fails_line() {
    let sim = SimulatorConfig::default().ignore("G4 P9");
    let config = SessionConfig::default()
        .without_polling()
        .with_ack_timeout(Duration::from_millis(100));
    let (controller, transport) = connect(sim, config).await;

    let handle = controller
        .stream_program(program(&["G0 X1", "G4 P9", "G0 X2"]))
        .await
        .unwrap();
    let report = handle.wait().await;

    match report.outcome {
        StreamOutcome::Failed {
            line_number,
            message,
            ..
        } => {
            assert_eq!(line_number, 2);
            assert!(message.contains("no acknowledgement"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(transport.journal().len(), 2);
    assert!(controller.is_connected());
}

#[tokio::test]
async fn test_pause_holds_next_line() {
    let sim = SimulatorConfig::default().with_ack_delay(Duration::from_millis(50));
    let (controller, transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let lines: Vec<String> = (1..=4).map(|i| format!("G0 X{}", i)).collect();
    let handle = controller.stream_program(lines).await.unwrap();

    wait_for_lines(&transport, 1).await;
    assert!(controller.pause_stream().await.unwrap());
    assert!(handle.is_paused());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.journal().len(), 1);
    assert_eq!(handle.completed(), 1);

    assert!(controller.resume_stream().await.unwrap());
    assert!(handle.wait().await.outcome.is_completed());
    assert_eq!(transport.realtime_bytes(), vec![b'!', b'~']);
}

#[tokio::test]
async fn test_link_loss_ends_paused_stream() {
    let sim = SimulatorConfig::default()
        .disconnect_after(2)
        .with_ack_delay(Duration::from_millis(100));
    let (controller, transport) = connect(sim, SessionConfig::default().without_polling()).await;

    let lines: Vec<String> = (1..=5).map(|i| format!("G0 X{}", i)).collect();
    let handle = controller.stream_program(lines).await.unwrap();

    wait_for_lines(&transport, 2).await;
    handle.pause();

    let report = tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .unwrap();
    match report.outcome {
        StreamOutcome::Aborted { reason } => assert!(reason.contains("connection lost")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.completed, 2);
    assert_eq!(controller.current_status().state, ControllerState::Disconnected);

    controller.connect("sim").await.unwrap();
    let next = controller.stream_program(program(&["G0 X0"])).await.unwrap();
    assert!(next.wait().await.outcome.is_completed());
}
