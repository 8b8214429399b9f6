use gcodelink_communication::{
    default_macros, SessionController, SimulatedTransport, SimulatorConfig,
};
use gcodelink_core::{
    Axis, ControllerError, ControllerEvent, ControllerState, Error, LogDirection, Position,
    SessionConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

fn setup(sim: SimulatorConfig, config: SessionConfig) -> (SessionController, SimulatedTransport) {
    let transport = SimulatedTransport::new(sim);
    let controller = SessionController::new(Arc::new(transport.clone()), config);
    (controller, transport)
}

async fn wait_for_state(controller: &SessionController, state: ControllerState) {
    let mut reader = controller.status_reader();
    tokio::time::timeout(Duration::from_secs(5), async {
        while reader.current().state != state {
            reader.changed().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_send_while_disconnected_is_logged() {
    let (controller, transport) =
        setup(SimulatorConfig::default(), SessionConfig::default());

    let err = controller.send_command("G0 X1").await.unwrap_err();
    assert!(matches!(err, Error::Controller(ControllerError::NotConnected)));

    let history = controller.log_history();
    let last = history.last().unwrap();
    assert_eq!(last.direction, LogDirection::Error);
    assert!(last.message.contains("G0 X1"));
    assert!(transport.journal().is_empty());
    assert!(controller.stream_program(vec!["G0 X1".into()]).await.is_err());
}

#[tokio::test]
async fn test_connect_and_disconnect_are_idempotent() {
    let (controller, _transport) =
        setup(SimulatorConfig::default(), SessionConfig::default().without_polling());
    let mut events = controller.subscribe_events();

    controller.connect("sim").await.unwrap();
    controller.connect("sim").await.unwrap();
    assert!(controller.is_connected());
    assert_eq!(controller.current_status().state, ControllerState::Idle);

    assert_eq!(
        events.try_recv().unwrap(),
        ControllerEvent::StateChanged(ControllerState::Connecting)
    );
    assert_eq!(
        events.try_recv().unwrap(),
        ControllerEvent::StateChanged(ControllerState::Idle)
    );
    assert_eq!(
        events.try_recv().unwrap(),
        ControllerEvent::Connected("sim".to_string())
    );
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    controller.disconnect().await.unwrap();
    controller.disconnect().await.unwrap();
    assert!(!controller.is_connected());
    assert_eq!(
        events.try_recv().unwrap(),
        ControllerEvent::StateChanged(ControllerState::Disconnected)
    );
    assert_eq!(events.try_recv().unwrap(), ControllerEvent::Disconnected);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    // Reconnecting after a disconnect opens a fresh link
    controller.connect("sim").await.unwrap();
    controller.send_command("G0 X1").await.unwrap();
}

#[tokio::test]
async fn test_console_log_records_traffic() {
    let (controller, _transport) =
        setup(SimulatorConfig::default(), SessionConfig::default().without_polling());
    controller.connect("sim").await.unwrap();
    let mut log = controller.subscribe_log();

    controller.send_command("G0 X1").await.unwrap();

    let entry = loop {
        let entry = log.recv().await.unwrap();
        if entry.direction == LogDirection::Outbound {
            break entry;
        }
    };
    assert_eq!(entry.message, "G0 X1");
    assert!(controller
        .log_history()
        .iter()
        .any(|e| e.direction == LogDirection::Inbound && e.message.starts_with("Grbl")));
}

#[tokio::test]
async fn test_multi_line_command_stops_at_rejection() {
    let (controller, transport) = setup(
        SimulatorConfig::default().reject("M7", 20),
        SessionConfig::default().without_polling(),
    );
    controller.connect("sim").await.unwrap();

    let err = controller
        .send_command("G0 X1\nM7\nG0 X2")
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(transport.received_lines(), vec!["G0 X1", "M7"]);
}

#[tokio::test]
async fn test_optimistic_settle_without_polling() {
    let config = SessionConfig::default()
        .without_polling()
        .with_settle_delay(Duration::from_millis(50));
    let (controller, _transport) = setup(SimulatorConfig::default(), config);
    controller.connect("sim").await.unwrap();

    controller.send_command("G0 X5").await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Run);
    assert_eq!(controller.current_status().wpos.x, 5.0);

    wait_for_state(&controller, ControllerState::Idle).await;
}

#[tokio::test]
async fn test_polled_reports_update_status() {
    let config = SessionConfig {
        status_poll_interval_ms: Some(20),
        ..SessionConfig::default()
    };
    let (controller, _transport) = setup(SimulatorConfig::default(), config);
    controller.connect("sim").await.unwrap();

    controller.send_command("G0 X12 Y3").await.unwrap();
    let mut reader = controller.status_reader();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = reader.current();
            if status.state == ControllerState::Idle && status.mpos.x == 12.0 {
                break;
            }
            reader.changed().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(controller.current_status().wpos, Position::new(12.0, 3.0, 0.0));
}

#[tokio::test]
async fn test_zero_axes_rebases_work_position() {
    let (controller, _transport) =
        setup(SimulatorConfig::default(), SessionConfig::default().without_polling());
    controller.connect("sim").await.unwrap();

    controller.send_command("G0 X10 Y5").await.unwrap();
    controller.zero_axes(&[Axis::X]).await.unwrap();

    let status = controller.current_status();
    assert_eq!(status.wpos, Position::new(0.0, 5.0, 0.0));
    assert_eq!(status.mpos, Position::new(10.0, 5.0, 0.0));
    assert_eq!(status.work_offset, Position::new(10.0, 0.0, 0.0));

    controller.send_command("G0 X2").await.unwrap();
    assert_eq!(controller.current_status().mpos.x, 12.0);
}

#[tokio::test]
async fn test_jog_moves_relative() {
    let (controller, transport) =
        setup(SimulatorConfig::default(), SessionConfig::default().without_polling());
    controller.connect("sim").await.unwrap();

    controller.send_command("G0 X10").await.unwrap();
    controller.jog(Axis::X, -2.5, 500.0).await.unwrap();
    controller.jog(Axis::Z, 1.0, 500.0).await.unwrap();

    assert_eq!(controller.current_status().wpos, Position::new(7.5, 0.0, 1.0));
    assert_eq!(
        transport.received_lines().last().unwrap(),
        "$J=G91 Z1.000 F500"
    );

    // Jogs are incremental without changing the program's distance mode
    controller.send_command("G0 X1").await.unwrap();
    assert_eq!(controller.current_status().wpos.x, 1.0);
}

#[tokio::test]
async fn test_boot_alarm_requires_unlock() {
    let config = SessionConfig {
        status_poll_interval_ms: Some(20),
        ..SessionConfig::default()
    };
    let (controller, transport) = setup(SimulatorConfig::default().locked(), config);
    controller.connect("sim").await.unwrap();
    wait_for_state(&controller, ControllerState::Alarm).await;

    let err = controller.send_command("G0 X1").await.unwrap_err();
    assert!(matches!(err, Error::Controller(ControllerError::AlarmLocked)));
    assert!(transport.journal().is_empty());

    controller.home().await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Idle);
    controller.send_command("G0 X1").await.unwrap();
}

#[tokio::test]
async fn test_error_9_latches_alarm() {
    let (controller, _transport) = setup(
        SimulatorConfig::default().locked(),
        SessionConfig::default().without_polling(),
    );
    controller.connect("sim").await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Idle);

    let err = controller.send_command("G0 X1").await.unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(controller.current_status().state, ControllerState::Alarm);

    controller.unlock().await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Idle);
}

#[tokio::test]
async fn test_feed_hold_and_cycle_start() {
    let (controller, transport) = setup(
        SimulatorConfig::default().with_motion_time(Duration::from_secs(10)),
        SessionConfig::default().without_polling(),
    );
    controller.connect("sim").await.unwrap();

    controller.send_command("G1 X10 F100").await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Run);

    controller.send_command("!").await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Hold);

    controller.cycle_start().await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Run);

    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.realtime_bytes().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(transport.realtime_bytes(), vec![b'!', b'~']);
    assert_eq!(transport.received_lines(), vec!["G1 X10 F100"]);
}

#[tokio::test]
async fn test_soft_reset_releases_pending_line() {
    let (controller, transport) = setup(
        SimulatorConfig::default().ignore("G4 P5"),
        SessionConfig::default().without_polling(),
    );
    let controller = Arc::new(controller);
    controller.connect("sim").await.unwrap();

    let pending = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.send_command("G4 P5").await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.journal().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    controller.soft_reset().await.unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_rejection());
    assert!(controller.is_connected());
    controller.send_command("G0 X1").await.unwrap();
}

#[tokio::test]
async fn test_run_macro_sends_every_line() {
    let (controller, transport) =
        setup(SimulatorConfig::default(), SessionConfig::default().without_polling());
    controller.connect("sim").await.unwrap();

    let park = default_macros()
        .into_iter()
        .find(|m| m.name == "PARK")
        .unwrap();
    controller.run_macro(&park).await.unwrap();
    assert_eq!(
        transport.received_lines(),
        vec!["G0 G53 Z-5", "G0 G53 X0 Y0"]
    );
}

#[tokio::test]
async fn test_connect_failure_returns_to_disconnected() {
    let transport = gcodelink_communication::TcpTransport::new();
    let controller = SessionController::new(
        Arc::new(transport),
        SessionConfig {
            connect_timeout_ms: 1000,
            ..SessionConfig::default()
        },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    assert!(controller.connect(&address).await.is_err());
    assert_eq!(
        controller.current_status().state,
        ControllerState::Disconnected
    );
}

#[tokio::test]
async fn test_machine_coordinate_move_after_zeroing() {
    let (controller, _transport) =
        setup(SimulatorConfig::default(), SessionConfig::default().without_polling());
    controller.connect("sim").await.unwrap();

    controller.send_command("G0 X50 Y50").await.unwrap();
    controller.send_command("G10 L20 P1 X0 Y0").await.unwrap();
    assert_eq!(controller.current_status().wpos, Position::ZERO);

    controller.send_command("G0 G53 X0 Y0").await.unwrap();
    let status = controller.current_status();
    assert_eq!(status.mpos, Position::ZERO);
    assert_eq!(status.wpos, Position::new(-50.0, -50.0, 0.0));
    assert_eq!(status.work_offset, Position::new(50.0, 50.0, 0.0));

    // Work coordinates resume from where the machine-coordinate move ended
    controller.send_command("G91 G0 X10").await.unwrap();
    assert_eq!(controller.current_status().mpos.x, 10.0);
}

#[tokio::test]
async fn test_machine_coordinate_move_with_polling() {
    let config = SessionConfig {
        status_poll_interval_ms: Some(20),
        ..SessionConfig::default()
    };
    let (controller, _transport) = setup(SimulatorConfig::default(), config);
    controller.connect("sim").await.unwrap();

    controller.send_command("G0 X20").await.unwrap();
    controller.zero_axes(&[Axis::X]).await.unwrap();
    controller.send_command("G0 G53 X5").await.unwrap();

    let mut reader = controller.status_reader();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = reader.current();
            if status.state == ControllerState::Idle && status.mpos.x == 5.0 {
                break;
            }
            reader.changed().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(controller.current_status().wpos.x, -15.0);
}

#[tokio::test]
async fn test_zero_poll_interval_settles_on_timer() {
    let config = SessionConfig {
        status_poll_interval_ms: Some(0),
        ..SessionConfig::default().with_settle_delay(Duration::from_millis(20))
    };
    let (controller, _transport) = setup(SimulatorConfig::default(), config);
    controller.connect("sim").await.unwrap();

    controller.send_command("G0 X3").await.unwrap();
    assert_eq!(controller.current_status().state, ControllerState::Run);
    wait_for_state(&controller, ControllerState::Idle).await;
    assert!(controller.is_connected());
}
