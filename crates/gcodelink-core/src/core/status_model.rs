//! Authoritative machine status
//!
//! `MachineStatusModel` is the only writer of [`MachineStatus`]. The session
//! pipeline feeds it controller status reports and locally inferred updates;
//! everything else reads cloned snapshots through a [`StatusReader`] backed
//! by a `tokio::sync::watch` channel, so reads never wait on the writer.
//!
//! Priority rules:
//! - A status report is authoritative and overrides any inferred state.
//! - An alarm is latched: reports declaring a non-alarm state do not clear
//!   it until [`MachineStatusModel::unlock`] is called. Positions in those
//!   reports still apply.
//! - An inferred `Run` (set when a motion line is acknowledged) only settles
//!   back to `Idle` if no report or newer motion has happened since.

use crate::data::{ControllerState, MachineStatus, Position, StatusReport};
use crate::error::{ControllerError, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Bookkeeping {
    alarm_latched: bool,
    /// Current `Run` state was inferred locally, not reported
    inferred: bool,
    /// Bumped on every acknowledged motion line
    generation: u64,
    /// Last known work coordinate offset
    wco: Position,
}

/// Single-writer owner of the machine status
pub struct MachineStatusModel {
    tx: watch::Sender<MachineStatus>,
    book: Mutex<Bookkeeping>,
}

impl MachineStatusModel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(MachineStatus::default());
        Self {
            tx,
            book: Mutex::new(Bookkeeping::default()),
        }
    }

    /// Clone of the current status
    pub fn snapshot(&self) -> MachineStatus {
        self.tx.borrow().clone()
    }

    /// Current state
    pub fn state(&self) -> ControllerState {
        self.tx.borrow().state
    }

    /// Whether an alarm is latched
    pub fn is_alarm_latched(&self) -> bool {
        self.book.lock().alarm_latched
    }

    /// A read handle that can be moved to other tasks
    pub fn reader(&self) -> StatusReader {
        StatusReader {
            rx: self.tx.subscribe(),
        }
    }

    fn transition(&self, target: ControllerState) -> Result<bool> {
        let current = self.state();
        if !current.can_transition_to(target) {
            return Err(ControllerError::InvalidStateTransition {
                current: current.to_string(),
                requested: target.to_string(),
            }
            .into());
        }
        Ok(self.set_state(target))
    }

    fn set_state(&self, target: ControllerState) -> bool {
        self.tx.send_if_modified(|status| {
            if status.state == target {
                return false;
            }
            debug!("Machine state {} -> {}", status.state, target);
            status.state = target;
            true
        })
    }

    /// Disconnected -> Connecting
    pub fn begin_connect(&self) -> Result<bool> {
        self.transition(ControllerState::Connecting)
    }

    /// Connecting -> Idle
    pub fn connected(&self) -> Result<bool> {
        self.transition(ControllerState::Idle)
    }

    /// Connecting -> Disconnected
    pub fn connect_failed(&self) -> bool {
        if self.state() == ControllerState::Connecting {
            self.set_state(ControllerState::Disconnected)
        } else {
            false
        }
    }

    /// Merge a controller status report
    ///
    /// Returns `true` when the state field changed. Reports received while
    /// disconnected are dropped.
    pub fn apply_report(&self, report: &StatusReport) -> bool {
        let current = self.state();
        if current == ControllerState::Disconnected {
            debug!("Dropping status report while disconnected");
            return false;
        }

        let mut book = self.book.lock();
        if let Some(wco) = report.wco {
            book.wco = wco;
        }
        if let (Some(mpos), Some(wpos)) = (report.mpos, report.wpos) {
            book.wco = mpos.sub(&wpos);
        }

        let target = if report.state == ControllerState::Alarm {
            book.alarm_latched = true;
            ControllerState::Alarm
        } else if book.alarm_latched {
            ControllerState::Alarm
        } else {
            report.state
        };
        book.inferred = false;
        let wco = book.wco;

        // `book` is held until the status is written
        let mut changed = false;
        self.tx.send_modify(|status| {
            match (report.mpos, report.wpos) {
                (Some(mpos), Some(wpos)) => {
                    status.mpos = mpos;
                    status.wpos = wpos;
                }
                (Some(mpos), None) => {
                    status.mpos = mpos;
                    status.wpos = mpos.sub(&wco);
                }
                (None, Some(wpos)) => {
                    status.wpos = wpos;
                    status.mpos = wpos.add(&wco);
                }
                (None, None) => {}
            }
            status.work_offset = wco;
            if let Some(feed) = report.feed_rate {
                status.feed_rate = feed;
            }
            if let Some(speed) = report.spindle_speed {
                status.spindle_speed = speed;
            }
            if let Some(overrides) = report.overrides {
                status.overrides = overrides;
            }
            if report.buffer.is_some() {
                status.buffer = report.buffer;
            }
            status.pins = report.pins.clone();
            status.accessory = report.accessory.clone();
            status.line = report.line;
            if status.state != target {
                debug!("Machine state {} -> {} (report)", status.state, target);
                status.state = target;
                changed = true;
            }
        });
        drop(book);
        changed
    }

    /// Record that a motion line was acknowledged
    ///
    /// Idle becomes an inferred Run. Returns the motion generation to hand
    /// to [`settle`](Self::settle).
    pub fn motion_acknowledged(&self) -> u64 {
        let mut book = self.book.lock();
        book.generation += 1;
        let generation = book.generation;
        if self.state() == ControllerState::Idle && !book.alarm_latched {
            book.inferred = true;
            self.set_state(ControllerState::Run);
        }
        generation
    }

    /// Return an inferred Run to Idle if nothing newer has happened
    pub fn settle(&self, generation: u64) -> bool {
        let mut book = self.book.lock();
        if !book.inferred || book.generation != generation {
            return false;
        }
        if self.state() != ControllerState::Run {
            return false;
        }
        book.inferred = false;
        self.set_state(ControllerState::Idle)
    }

    /// Move a connected machine into Alarm and latch it
    pub fn raise_alarm(&self, code: u32) -> bool {
        if !self.state().is_connected() {
            warn!("Ignoring alarm {} while not connected", code);
            return false;
        }
        let mut book = self.book.lock();
        book.alarm_latched = true;
        book.inferred = false;
        self.set_state(ControllerState::Alarm)
    }

    /// Clear a latched alarm (Alarm -> Idle)
    pub fn unlock(&self) -> bool {
        let mut book = self.book.lock();
        if !book.alarm_latched && self.state() != ControllerState::Alarm {
            return false;
        }
        book.alarm_latched = false;
        book.inferred = false;
        self.set_state(ControllerState::Idle)
    }

    /// Locally inferred state change such as Run -> Hold on a feed hold
    pub fn infer_state(&self, target: ControllerState) -> Result<bool> {
        if self.is_alarm_latched() {
            return Err(ControllerError::AlarmLocked.into());
        }
        self.transition(target)
    }

    /// Set the work position and derive the machine position from the
    /// cached work offset
    pub fn apply_position_estimate(&self, wpos: Position) {
        if !self.state().is_connected() {
            return;
        }
        let wco = self.book.lock().wco;
        self.tx.send_modify(|status| {
            status.wpos = wpos;
            status.mpos = wpos.add(&wco);
            status.work_offset = wco;
        });
    }

    /// Declare new work coordinates for the current machine position
    ///
    /// Used after a work offset is set (G10 L20, G92): the machine does not
    /// move, the work offset absorbs the difference.
    pub fn rebase_work_position(&self, wpos: Position) {
        if !self.state().is_connected() {
            return;
        }
        let mpos = self.tx.borrow().mpos;
        let wco = mpos.sub(&wpos);
        self.book.lock().wco = wco;
        self.tx.send_modify(|status| {
            status.wpos = wpos;
            status.work_offset = wco;
        });
    }

    /// Any -> Disconnected, resetting everything to defaults
    pub fn disconnect(&self) -> bool {
        *self.book.lock() = Bookkeeping::default();
        let was = self.state();
        self.tx.send_replace(MachineStatus::default());
        was != ControllerState::Disconnected
    }
}

impl Default for MachineStatusModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking read handle on the machine status
#[derive(Clone)]
pub struct StatusReader {
    rx: watch::Receiver<MachineStatus>,
}

impl StatusReader {
    /// Clone of the latest status
    pub fn current(&self) -> MachineStatus {
        self.rx.borrow().clone()
    }

    /// Wait for the next change and return it
    ///
    /// Returns `None` once the model is dropped.
    pub async fn changed(&mut self) -> Option<MachineStatus> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
