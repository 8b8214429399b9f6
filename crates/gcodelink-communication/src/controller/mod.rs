//! Session Controller
//!
//! Owns one controller connection at a time: opens the transport, spawns
//! the inbound reader and the optional status poller, serializes immediate
//! commands with program streams, and exposes the machine status model,
//! the console log and controller events to callers.

mod pipeline;
mod session;
pub mod streamer;

use crate::communication::{Link, Transport};
use crate::firmware::grbl::commands::{
    jog_command, realtime, realtime_byte, realtime_name, zero_axes_command, Macro, HOME, UNLOCK,
};
use gcodelink_core::{
    Axis, ConsoleLog, ControllerError, ControllerEvent, ControllerState, Error, EventDispatcher,
    LogEntry, LogSubscription, MachineStatus, MachineStatusModel, Position, Result, SessionConfig,
    StatusReader, TransportError,
};
use gcodelink_visualizer::gcode::strip_comments;
use gcodelink_visualizer::{PathBuilder, Toolpath};
use pipeline::Pipeline;
use session::SessionCore;
use std::sync::Arc;
use streamer::{CommandStreamer, StreamHandle};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Tasks and shared state of one open connection
struct Connection {
    core: Arc<SessionCore>,
    reader: JoinHandle<()>,
    poller: Option<JoinHandle<()>>,
}

impl Connection {
    async fn teardown(&self) {
        if let Some(poller) = &self.poller {
            poller.abort();
        }
        self.reader.abort();
        self.core.pipeline.close().await;
    }
}

/// Controller session facade
///
/// All methods take `&self`; the controller can be shared behind an `Arc`
/// between a UI, a streaming task and status observers.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    model: Arc<MachineStatusModel>,
    log: ConsoleLog,
    events: EventDispatcher,
    connection: Mutex<Option<Connection>>,
    stream: parking_lot::Mutex<Option<StreamHandle>>,
}

impl SessionController {
    /// Create a disconnected controller using `transport`
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            log: ConsoleLog::new(config.log_capacity),
            events: EventDispatcher::new(config.event_buffer),
            model: Arc::new(MachineStatusModel::new()),
            config,
            connection: Mutex::new(None),
            stream: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn notify(&self, changed: bool) {
        if changed {
            self.events
                .publish(ControllerEvent::StateChanged(self.model.state()));
        }
    }

    /// Open a connection to `address`
    ///
    /// Connecting while connected is a no-op.
    pub async fn connect(&self, address: &str) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if let Some(existing) = connection.take() {
            if self.model.state().is_connected() {
                debug!("Already connected to {}", existing.core.address);
                *connection = Some(existing);
                return Ok(());
            }
            // The reader saw the link drop; clean up what is left of it
            existing.teardown().await;
            existing.core.abort_stream("connection lost");
        }
        let stale = self.stream.lock().clone();
        if let Some(handle) = stale.filter(|handle| !handle.is_finished()) {
            handle.abort("reconnecting");
            handle.wait().await;
        }

        self.notify(self.model.begin_connect()?);
        info!("Connecting to {} via {}", address, self.transport.name());
        self.log.info(format!("Connecting to {}", address));

        let opened = tokio::time::timeout(
            self.config.connect_timeout(),
            self.transport.open(address),
        )
        .await;
        let link = match opened {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(self.connect_failed(address, e)),
            Err(_) => {
                let e = TransportError::ConnectionTimeout {
                    timeout_ms: self.config.connect_timeout_ms,
                }
                .into();
                return Err(self.connect_failed(address, e));
            }
        };

        let Link {
            inbound,
            outbound,
            peer,
        } = link;
        let (pipeline, replies) = Pipeline::new(outbound);
        let core = Arc::new(SessionCore::new(
            pipeline,
            self.model.clone(),
            self.log.clone(),
            self.events.clone(),
            self.config.clone(),
            address.to_string(),
        ));

        // Idle before the reader starts, so a boot-time alarm report wins
        self.notify(self.model.connected()?);
        let reader = tokio::spawn(core.clone().read_loop(inbound, replies));
        let poller = self
            .config
            .status_poll_interval()
            .map(|period| tokio::spawn(core.clone().poll_loop(period)));

        info!("Connected to {}", peer);
        self.log.info(format!("Connected to {}", peer));
        self.events
            .publish(ControllerEvent::Connected(address.to_string()));
        *connection = Some(Connection {
            core,
            reader,
            poller,
        });
        Ok(())
    }

    fn connect_failed(&self, address: &str, e: Error) -> Error {
        error!("Failed to connect to {}: {}", address, e);
        self.log.error(format!("Failed to connect to {}: {}", address, e));
        self.notify(self.model.connect_failed());
        self.events.publish(ControllerEvent::Error(e.to_string()));
        e
    }

    /// Close the connection; a running stream ends aborted
    ///
    /// Disconnecting while disconnected is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(stream) = self.stream.lock().as_ref() {
            stream.abort("disconnected");
        }

        let Some(connection) = self.connection.lock().await.take() else {
            debug!("Disconnect requested while not connected");
            return Ok(());
        };
        connection.teardown().await;
        if connection.core.mark_disconnected() {
            info!("Disconnected from {}", connection.core.address);
            self.log.info("Disconnected");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.model.state().is_connected()
    }

    async fn session(&self) -> Option<Arc<SessionCore>> {
        if !self.is_connected() {
            return None;
        }
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|connection| connection.core.clone())
    }

    async fn require_session(&self, what: &str) -> Result<Arc<SessionCore>> {
        match self.session().await {
            Some(core) => Ok(core),
            None => {
                warn!("Not connected, dropping '{}'", what);
                self.log
                    .error(format!("Not connected, cannot send '{}'", what));
                Err(ControllerError::NotConnected.into())
            }
        }
    }

    /// Send operator input
    ///
    /// A lone realtime character (`?`, `!`, `~`, 0x18) is written
    /// immediately. Anything else is sent line by line, each line waiting
    /// for its acknowledgement; the first rejected line ends the call.
    pub async fn send_command(&self, text: &str) -> Result<()> {
        let core = self.require_session(text.trim()).await?;

        if let Some(byte) = realtime_byte(text) {
            return self.send_realtime(&core, byte).await;
        }

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if strip_comments(line).trim().is_empty() {
                continue;
            }
            core.execute_line(line, index + 1).await?;
            self.events
                .publish(ControllerEvent::CommandComplete(line.to_string()));
        }
        Ok(())
    }

    async fn send_realtime(&self, core: &SessionCore, byte: u8) -> Result<()> {
        if byte == realtime::SOFT_RESET {
            core.pipeline.mark_reset();
        }
        core.pipeline.write_realtime(byte).await?;
        core.log.outbound(realtime_name(byte));

        let target = match byte {
            realtime::FEED_HOLD if self.model.state().is_moving() => ControllerState::Hold,
            realtime::CYCLE_START if self.model.state() == ControllerState::Hold => {
                ControllerState::Run
            }
            _ => return Ok(()),
        };
        match self.model.infer_state(target) {
            Ok(changed) => self.notify(changed),
            Err(e) => debug!("Not inferring {}: {}", target, e),
        }
        Ok(())
    }

    /// Start streaming a program
    ///
    /// Fails with `StreamActive` while another stream is unfinished.
    pub async fn stream_program(&self, lines: Vec<String>) -> Result<StreamHandle> {
        let core = self.require_session("program").await?;
        let mut active = self.stream.lock();
        if active.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(ControllerError::StreamActive.into());
        }
        let handle = CommandStreamer::new(core).start(lines);
        *active = Some(handle.clone());
        Ok(handle)
    }

    /// The most recently started stream, finished or not
    pub fn active_stream(&self) -> Option<StreamHandle> {
        self.stream.lock().clone()
    }

    fn running_stream(&self) -> Option<StreamHandle> {
        self.stream
            .lock()
            .as_ref()
            .filter(|handle| !handle.is_finished())
            .cloned()
    }

    /// Cancel the running stream; returns `false` when none is running
    pub fn cancel_stream(&self) -> bool {
        match self.running_stream() {
            Some(handle) => {
                info!("Cancelling stream at {:.1}%", handle.progress());
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Hold the running stream and the machine
    pub async fn pause_stream(&self) -> Result<bool> {
        let Some(handle) = self.running_stream() else {
            return Ok(false);
        };
        handle.pause();
        self.feed_hold().await?;
        Ok(true)
    }

    /// Resume a paused stream and the machine
    pub async fn resume_stream(&self) -> Result<bool> {
        let Some(handle) = self.running_stream() else {
            return Ok(false);
        };
        self.cycle_start().await?;
        handle.resume();
        Ok(true)
    }

    pub async fn jog(&self, axis: Axis, distance: f64, feed_rate: f64) -> Result<()> {
        self.send_command(&jog_command(axis, distance, feed_rate))
            .await
    }

    /// Make the current position the work zero of `axes` (all when empty)
    pub async fn zero_axes(&self, axes: &[Axis]) -> Result<()> {
        self.send_command(&zero_axes_command(axes)).await
    }

    pub async fn home(&self) -> Result<()> {
        self.send_command(HOME).await
    }

    /// Clear an alarm lock
    pub async fn unlock(&self) -> Result<()> {
        self.send_command(UNLOCK).await
    }

    pub async fn feed_hold(&self) -> Result<()> {
        let core = self.require_session("feed hold").await?;
        self.send_realtime(&core, realtime::FEED_HOLD).await
    }

    pub async fn cycle_start(&self) -> Result<()> {
        let core = self.require_session("cycle start").await?;
        self.send_realtime(&core, realtime::CYCLE_START).await
    }

    pub async fn soft_reset(&self) -> Result<()> {
        let core = self.require_session("soft reset").await?;
        warn!("Soft reset requested");
        self.send_realtime(&core, realtime::SOFT_RESET).await
    }

    /// Send every line of a macro, stopping at the first rejection
    pub async fn run_macro(&self, m: &Macro) -> Result<()> {
        info!("Running macro {}", m.name);
        self.log.info(format!("Macro {}", m.name));
        for line in m.lines() {
            self.send_command(line).await?;
        }
        Ok(())
    }

    pub fn current_status(&self) -> MachineStatus {
        self.model.snapshot()
    }

    pub fn status_reader(&self) -> StatusReader {
        self.model.reader()
    }

    /// Console entries appended from now on
    pub fn subscribe_log(&self) -> LogSubscription {
        self.log.subscribe()
    }

    /// Retained console entries, oldest first
    pub fn log_history(&self) -> Vec<LogEntry> {
        self.log.entries()
    }

    pub fn console_log(&self) -> &ConsoleLog {
        &self.log
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Toolpath of `lines` with bounds that also cover `current`
    pub fn visualize<S: AsRef<str>>(&self, lines: &[S], current: Position) -> Toolpath {
        PathBuilder::build(lines, current)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            if let Some(poller) = connection.poller {
                poller.abort();
            }
            connection.reader.abort();
        }
    }
}
