//! Per-connection session state shared by the controller, the streamer,
//! the inbound reader and the status poller.

use super::pipeline::{Pipeline, Reply, ReplySender};
use super::streamer::StreamHandle;
use crate::communication::{BoxedReader, LineBuffer};
use crate::firmware::grbl::commands::realtime;
use crate::firmware::grbl::error_decoder::{decode_alarm, is_fatal_error};
use crate::firmware::grbl::{classify, InboundMessage};
use gcodelink_core::{
    ConsoleLog, ControllerError, ControllerEvent, ControllerState, EventDispatcher,
    MachineStatusModel, Position, Result, SessionConfig,
};
use gcodelink_visualizer::{parse_line, Command, GCodeInterpreter, OffsetTarget};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

pub(crate) struct SessionCore {
    pub(crate) pipeline: Pipeline,
    pub(crate) model: Arc<MachineStatusModel>,
    pub(crate) log: ConsoleLog,
    pub(crate) events: EventDispatcher,
    pub(crate) config: SessionConfig,
    pub(crate) address: String,
    interpreter: Mutex<GCodeInterpreter>,
    stream: Mutex<Option<StreamHandle>>,
}

impl SessionCore {
    pub(crate) fn new(
        pipeline: Pipeline,
        model: Arc<MachineStatusModel>,
        log: ConsoleLog,
        events: EventDispatcher,
        config: SessionConfig,
        address: String,
    ) -> Self {
        let interpreter = GCodeInterpreter::with_position(model.snapshot().wpos);
        Self {
            pipeline,
            model,
            log,
            events,
            config,
            address,
            interpreter: Mutex::new(interpreter),
            stream: Mutex::new(None),
        }
    }

    /// Remember the stream running on this session so link loss can end it
    pub(crate) fn track_stream(&self, handle: StreamHandle) {
        *self.stream.lock() = Some(handle.clone());
        // The reader marks the model before it aborts the tracked stream
        if !self.model.state().is_connected() {
            handle.abort("not connected");
        }
    }

    /// End the stream running on this session, paused or not
    pub(crate) fn abort_stream(&self, reason: &str) {
        if let Some(handle) = self.stream.lock().take() {
            handle.abort(reason);
        }
    }

    /// Publish the current state if a model call reported a change
    pub(crate) fn notify_state(&self, changed: bool) {
        if changed {
            self.events
                .publish(ControllerEvent::StateChanged(self.model.state()));
        }
    }

    /// Send one acknowledged line and apply its effects once accepted
    ///
    /// `line_number` is only used for error reporting.
    pub(crate) async fn execute_line(&self, line: &str, line_number: usize) -> Result<Command> {
        let mut transaction = self.pipeline.begin().await;

        let (command, next_modal) = {
            let mut interpreter = self.interpreter.lock();
            interpreter.sync_work_offset(self.model.snapshot().work_offset);
            parse_line(line, interpreter.modal())
        };
        if self.model.is_alarm_latched() && command.is_motion() && command != Command::Home {
            self.log
                .error(format!("Rejected '{}': machine is in alarm, unlock first", line));
            return Err(ControllerError::AlarmLocked.into());
        }

        self.log.outbound(line);
        let reply = transaction.exchange(line, self.config.ack_timeout()).await?;
        drop(transaction);

        match reply {
            Reply::Ok => {
                self.interpreter.lock().sync_modal(next_modal);
                self.apply_accepted(&command);
                Ok(command)
            }
            Reply::Error { code, text } => {
                if is_fatal_error(code, &text) {
                    warn!("Fatal-class response '{}' to '{}'", text, line);
                    self.notify_state(self.model.raise_alarm(code.unwrap_or(0)));
                }
                self.events.publish(ControllerEvent::Error(format!(
                    "{} rejected: {}",
                    line, text
                )));
                Err(ControllerError::CommandRejected {
                    line_number,
                    line: line.to_string(),
                    message: text,
                }
                .into())
            }
            Reply::Alarm { code, text } => Err(ControllerError::Alarm {
                code,
                message: format!("{} ({})", text, decode_alarm(code)),
            }
            .into()),
            Reply::Reset => Err(ControllerError::CommandRejected {
                line_number,
                line: line.to_string(),
                message: "controller reset".to_string(),
            }
            .into()),
        }
    }

    fn apply_accepted(&self, command: &Command) {
        match command {
            Command::Motion(motion) => self.record_motion(motion.target),
            Command::Jog(motion) => {
                self.interpreter.lock().sync_position(motion.target);
                self.record_motion(motion.target);
            }
            Command::Unlock | Command::Home => {
                self.notify_state(self.model.unlock());
            }
            Command::SetCoordinateSystem { target, values } => {
                let active = self.interpreter.lock().modal().coordinate_system;
                let applies = match target {
                    OffsetTarget::WorkCoordinate(p) => *p == 0 || *p == active,
                    OffsetTarget::Temporary => true,
                };
                if applies {
                    let wpos = values.apply_to(&self.model.snapshot().wpos);
                    self.model.rebase_work_position(wpos);
                }
            }
            _ => {}
        }
    }

    fn record_motion(&self, target: Position) {
        let before = self.model.state();
        let generation = self.model.motion_acknowledged();
        self.notify_state(self.model.state() != before);
        self.model.apply_position_estimate(target);

        if self.config.status_poll_interval().is_none() {
            let model = self.model.clone();
            let events = self.events.clone();
            let delay = self.config.settle_delay();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if model.settle(generation) {
                    events.publish(ControllerEvent::StateChanged(model.state()));
                }
            });
        }
    }

    /// Mark the session as gone; returns `true` the first time
    pub(crate) fn mark_disconnected(&self) -> bool {
        let changed = self.model.disconnect();
        if changed {
            self.events
                .publish(ControllerEvent::StateChanged(ControllerState::Disconnected));
            self.events.publish(ControllerEvent::Disconnected);
        }
        changed
    }

    fn handle_line(&self, line: &str, replies: &ReplySender) {
        match classify(line) {
            Ok(InboundMessage::Status(report)) => {
                let changed = self.model.apply_report(&report);
                self.notify_state(changed);
            }
            Ok(InboundMessage::Ok) => {
                let _ = replies.send(Reply::Ok);
            }
            Ok(InboundMessage::Error { code, text }) => {
                self.log.inbound(&text);
                let _ = replies.send(Reply::Error { code, text });
            }
            Ok(InboundMessage::Alarm { code, text }) => {
                let description = decode_alarm(code);
                error!("Controller alarm {}: {}", code, description);
                self.log.inbound(&text);
                self.notify_state(self.model.raise_alarm(code));
                self.events.publish(ControllerEvent::Alarm(code, description));
                let _ = replies.send(Reply::Alarm { code, text });
            }
            Ok(InboundMessage::Banner(text)) => {
                info!("Controller banner: {}", text);
                self.log.inbound(&text);
                if self.pipeline.take_reset() {
                    let _ = replies.send(Reply::Reset);
                }
            }
            Ok(InboundMessage::Text(text)) => {
                self.log.inbound(text);
            }
            Err(e) => {
                warn!("Dropping inbound line: {}", e);
                self.log.error(e.to_string());
            }
        }
    }

    /// Reader task body: bytes -> lines -> classified messages
    pub(crate) async fn read_loop(self: Arc<Self>, mut inbound: BoxedReader, replies: ReplySender) {
        let mut lines = LineBuffer::new();
        let mut buf = [0u8; 1024];

        let reason = loop {
            match inbound.read(&mut buf).await {
                Ok(0) => break "connection closed by peer".to_string(),
                Ok(n) => {
                    for line in lines.push(&buf[..n]) {
                        self.handle_line(&line, &replies);
                    }
                }
                Err(e) => break e.to_string(),
            }
        };

        if self.mark_disconnected() {
            error!("Connection to {} lost: {}", self.address, reason);
            self.log.error(format!("Connection lost: {}", reason));
        }
        self.abort_stream(&format!("connection lost: {}", reason));
    }

    /// Poller task body: `?` every `period` until a write fails
    pub(crate) async fn poll_loop(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.pipeline.write_realtime(realtime::STATUS_QUERY).await {
                debug!("Status polling stopped: {}", e);
                break;
            }
        }
    }
}
