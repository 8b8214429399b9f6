//! In-process GRBL emulation
//!
//! [`SimulatedTransport`] answers the GRBL line protocol over an in-memory
//! duplex stream. Moves complete instantly unless a motion time is
//! configured, positions are tracked with the same interpreter the
//! visualizer uses, and responses can be scripted per line to exercise
//! rejections, alarms, silence and link loss.
//!
//! Every received line is journaled with the instant it arrived and the
//! instant it was answered, so callers can check acknowledgement gating.

use super::line_buffer::LineBuffer;
use super::{Link, Transport};
use crate::firmware::grbl::commands::realtime;
use async_trait::async_trait;
use gcodelink_core::{ControllerState, Position, Result};
use gcodelink_visualizer::{parse_line, Command, GCodeInterpreter};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub const SIMULATOR_BANNER: &str = "Grbl 1.1h ['$' for help]";

/// Scripted behaviour of the simulated controller
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Send the startup banner when a link opens
    pub banner: bool,
    /// Start in Alarm, as a machine with homing enabled does
    pub start_locked: bool,
    /// Delay before each line is answered
    pub ack_delay: Duration,
    /// Time an acknowledged move keeps the machine in Run
    pub motion_time: Duration,
    /// Lines containing the pattern are answered `error:<code>`
    pub rejections: Vec<(String, u32)>,
    /// Lines containing the pattern raise `ALARM:<code>`
    pub alarms: Vec<(String, u32)>,
    /// Lines containing the pattern are never answered
    pub silent: Vec<String>,
    /// Close the link after answering this many lines
    pub disconnect_after: Option<usize>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            banner: true,
            start_locked: false,
            ack_delay: Duration::from_millis(1),
            motion_time: Duration::ZERO,
            rejections: Vec::new(),
            alarms: Vec::new(),
            silent: Vec::new(),
            disconnect_after: None,
        }
    }
}

impl SimulatorConfig {
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    pub fn with_motion_time(mut self, time: Duration) -> Self {
        self.motion_time = time;
        self
    }

    pub fn reject(mut self, pattern: impl Into<String>, code: u32) -> Self {
        self.rejections.push((pattern.into(), code));
        self
    }

    pub fn alarm_on(mut self, pattern: impl Into<String>, code: u32) -> Self {
        self.alarms.push((pattern.into(), code));
        self
    }

    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.silent.push(pattern.into());
        self
    }

    pub fn disconnect_after(mut self, lines: usize) -> Self {
        self.disconnect_after = Some(lines);
        self
    }

    pub fn locked(mut self) -> Self {
        self.start_locked = true;
        self
    }

    pub fn without_banner(mut self) -> Self {
        self.banner = false;
        self
    }

    fn matching<'a>(patterns: &'a [(String, u32)], line: &str) -> Option<u32> {
        patterns
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, code)| *code)
    }
}

/// One line as seen by the simulated controller
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedLine {
    pub text: String,
    pub received_at: Instant,
    /// `None` until a terminal response was written
    pub answered_at: Option<Instant>,
}

type Journal = Arc<Mutex<Vec<ReceivedLine>>>;
type SharedWriter = Arc<tokio::sync::Mutex<Option<WriteHalf<DuplexStream>>>>;

/// Transport backed by an emulated GRBL controller
#[derive(Clone, Default)]
pub struct SimulatedTransport {
    config: SimulatorConfig,
    journal: Journal,
    realtime: Arc<Mutex<Vec<u8>>>,
}

impl SimulatedTransport {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Every line received so far, in arrival order
    pub fn journal(&self) -> Vec<ReceivedLine> {
        self.journal.lock().clone()
    }

    /// Text of every line received so far
    pub fn received_lines(&self) -> Vec<String> {
        self.journal.lock().iter().map(|l| l.text.clone()).collect()
    }

    /// Realtime bytes received so far, excluding status queries
    pub fn realtime_bytes(&self) -> Vec<u8> {
        self.realtime.lock().clone()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn open(&self, address: &str) -> Result<Link> {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);

        let machine = Arc::new(Mutex::new(SimMachine::new(self.config.start_locked)));
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(Some(server_write)));
        let epoch = Arc::new(AtomicU64::new(0));
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        if self.config.banner {
            respond(&writer, &[SIMULATOR_BANNER.to_string()]).await;
            if self.config.start_locked {
                respond(&writer, &["[MSG:'$H'|'$X' to unlock]".to_string()]).await;
            }
        }

        tokio::spawn(receive(
            server_read,
            machine.clone(),
            writer.clone(),
            epoch.clone(),
            self.journal.clone(),
            self.realtime.clone(),
            line_tx,
        ));
        tokio::spawn(answer(
            self.config.clone(),
            machine,
            writer,
            epoch,
            self.journal.clone(),
            line_rx,
        ));

        debug!("Simulated controller listening as {}", address);
        Ok(Link::new(
            client_read,
            client_write,
            format!("simulator ({})", address),
        ))
    }

    fn name(&self) -> &str {
        "simulator"
    }
}

struct SimMachine {
    state: ControllerState,
    interpreter: GCodeInterpreter,
    busy_until: Option<Instant>,
}

impl SimMachine {
    fn new(locked: bool) -> Self {
        Self {
            state: if locked {
                ControllerState::Alarm
            } else {
                ControllerState::Idle
            },
            interpreter: GCodeInterpreter::new(),
            busy_until: None,
        }
    }

    /// The interpreter tracks offsets set by G10 L20 and G92
    fn wco(&self) -> Position {
        self.interpreter.modal().work_offset
    }

    fn tick(&mut self) {
        if let Some(until) = self.busy_until {
            if self.state == ControllerState::Run && Instant::now() >= until {
                self.state = ControllerState::Idle;
                self.busy_until = None;
            }
        }
    }

    fn status_line(&mut self) -> String {
        self.tick();
        let wco = self.wco();
        let modal = self.interpreter.modal();
        let mpos = modal.position.add(&wco);
        let state = match self.state {
            ControllerState::Hold => "Hold:0".to_string(),
            other => other.to_string(),
        };
        format!(
            "<{}|MPos:{:.3},{:.3},{:.3}|FS:{:.0},{:.0}|WCO:{:.3},{:.3},{:.3}>",
            state,
            mpos.x,
            mpos.y,
            mpos.z,
            modal.feed_rate.unwrap_or(0.0),
            modal.spindle_speed,
            wco.x,
            wco.y,
            wco.z
        )
    }

    fn realtime(&mut self, byte: u8) {
        self.tick();
        match byte {
            realtime::FEED_HOLD if self.state == ControllerState::Run => {
                self.state = ControllerState::Hold;
            }
            realtime::CYCLE_START if self.state == ControllerState::Hold => {
                self.state = if self.busy_until.is_some() {
                    ControllerState::Run
                } else {
                    ControllerState::Idle
                };
            }
            realtime::SOFT_RESET => {
                if self.state != ControllerState::Alarm {
                    self.state = ControllerState::Idle;
                }
                self.busy_until = None;
            }
            _ => {}
        }
    }

    /// Responses to one line; empty means the line is never answered
    fn execute(&mut self, line: &str, config: &SimulatorConfig) -> Vec<String> {
        if config.silent.iter().any(|pattern| line.contains(pattern.as_str())) {
            return Vec::new();
        }
        if let Some(code) = SimulatorConfig::matching(&config.alarms, line) {
            self.state = ControllerState::Alarm;
            self.busy_until = None;
            return vec![format!("ALARM:{}", code)];
        }
        if let Some(code) = SimulatorConfig::matching(&config.rejections, line) {
            return vec![format!("error:{}", code)];
        }

        let upper = line.to_ascii_uppercase();
        if upper == "$X" {
            if self.state == ControllerState::Alarm {
                self.state = ControllerState::Idle;
                return vec!["[MSG:Caution: Unlocked]".to_string(), "ok".to_string()];
            }
            return vec!["ok".to_string()];
        }
        if upper == "$H" {
            self.state = ControllerState::Idle;
            self.interpreter
                .sync_position(Position::ZERO.sub(&self.wco()));
            return vec!["ok".to_string()];
        }
        if self.state == ControllerState::Alarm && !upper.starts_with('$') {
            return vec!["error:9".to_string()];
        }

        let (command, modal) = parse_line(line, self.interpreter.modal());
        match command {
            Command::Jog(motion) => {
                self.interpreter.sync_position(motion.target);
                self.start_motion(config);
            }
            Command::Motion(_) | Command::Probe { .. } => {
                self.interpreter.sync_modal(modal);
                self.start_motion(config);
            }
            _ => self.interpreter.sync_modal(modal),
        }
        vec!["ok".to_string()]
    }

    fn start_motion(&mut self, config: &SimulatorConfig) {
        if config.motion_time.is_zero() {
            return;
        }
        self.busy_until = Some(Instant::now() + config.motion_time);
        if self.state == ControllerState::Idle {
            self.state = ControllerState::Run;
        }
    }
}

async fn respond(writer: &SharedWriter, lines: &[String]) -> bool {
    let mut guard = writer.lock().await;
    let Some(out) = guard.as_mut() else {
        return false;
    };
    for line in lines {
        trace!("sim >> {}", line);
        let framed = format!("{}\r\n", line);
        if out.write_all(framed.as_bytes()).await.is_err() {
            return false;
        }
    }
    out.flush().await.is_ok()
}

/// Split inbound bytes into realtime commands and lines
async fn receive(
    mut inbound: ReadHalf<DuplexStream>,
    machine: Arc<Mutex<SimMachine>>,
    writer: SharedWriter,
    epoch: Arc<AtomicU64>,
    journal: Journal,
    realtime_log: Arc<Mutex<Vec<u8>>>,
    lines: mpsc::UnboundedSender<(usize, String, u64)>,
) {
    let mut buffer = LineBuffer::new();
    let mut buf = [0u8; 512];
    loop {
        let n = match inbound.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        let mut text = Vec::with_capacity(n);
        for &byte in &buf[..n] {
            match byte {
                realtime::STATUS_QUERY => {
                    let status = machine.lock().status_line();
                    respond(&writer, &[status]).await;
                }
                realtime::FEED_HOLD
                | realtime::CYCLE_START
                | realtime::SOFT_RESET
                | realtime::JOG_CANCEL => {
                    realtime_log.lock().push(byte);
                    machine.lock().realtime(byte);
                    if byte == realtime::SOFT_RESET {
                        epoch.fetch_add(1, Ordering::SeqCst);
                        respond(&writer, &[SIMULATOR_BANNER.to_string()]).await;
                    }
                }
                other => text.push(other),
            }
        }

        for line in buffer.push(&text) {
            let index = {
                let mut journal = journal.lock();
                journal.push(ReceivedLine {
                    text: line.clone(),
                    received_at: Instant::now(),
                    answered_at: None,
                });
                journal.len() - 1
            };
            trace!("sim << {}", line);
            if lines
                .send((index, line, epoch.load(Ordering::SeqCst)))
                .is_err()
            {
                return;
            }
        }
    }
    debug!("Simulated controller input closed");
}

/// Answer lines one at a time, in arrival order
async fn answer(
    config: SimulatorConfig,
    machine: Arc<Mutex<SimMachine>>,
    writer: SharedWriter,
    epoch: Arc<AtomicU64>,
    journal: Journal,
    mut lines: mpsc::UnboundedReceiver<(usize, String, u64)>,
) {
    let mut answered = 0usize;
    while let Some((index, line, received_epoch)) = lines.recv().await {
        if !config.ack_delay.is_zero() {
            tokio::time::sleep(config.ack_delay).await;
        }
        if epoch.load(Ordering::SeqCst) != received_epoch {
            debug!("Dropping '{}' queued before a reset", line);
            continue;
        }

        let responses = machine.lock().execute(&line, &config);
        if responses.is_empty() {
            debug!("Simulator ignoring '{}'", line);
            continue;
        }
        if let Some(entry) = journal.lock().get_mut(index) {
            entry.answered_at = Some(Instant::now());
        }
        if !respond(&writer, &responses).await {
            break;
        }

        answered += 1;
        if config.disconnect_after == Some(answered) {
            debug!("Simulator closing link after {} lines", answered);
            if let Some(mut out) = writer.lock().await.take() {
                let _ = out.shutdown().await;
            }
            break;
        }
    }
}
