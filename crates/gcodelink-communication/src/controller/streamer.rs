//! Acknowledgement-gated program streaming
//!
//! A stream sends one program line, waits for its terminal response and
//! only then sends the next. Progress, pause and cancellation are shared
//! through a cloneable [`StreamHandle`]; the outcome is published once as
//! a [`StreamReport`].

use super::session::SessionCore;
use gcodelink_core::{ControllerError, ControllerEvent, Error, StreamOutcome};
use gcodelink_visualizer::gcode::strip_comments;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        completed as f64 * 100.0 / total as f64
    }
}

/// Final result of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamReport {
    pub outcome: StreamOutcome,
    /// Lines completed, including skipped blank and comment lines
    pub completed: usize,
    pub total: usize,
}

impl StreamReport {
    /// Completion in percent
    pub fn progress(&self) -> f64 {
        percent(self.completed, self.total)
    }
}

struct StreamShared {
    total: usize,
    completed: AtomicUsize,
    cancelled: AtomicBool,
    paused: watch::Sender<bool>,
    abort_reason: Mutex<Option<String>>,
    done: watch::Sender<Option<StreamReport>>,
}

/// Control and observation handle for a running stream
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<StreamShared>,
}

impl StreamHandle {
    fn new(total: usize) -> Self {
        Self {
            shared: Arc::new(StreamShared {
                total,
                completed: AtomicUsize::new(0),
                cancelled: AtomicBool::new(false),
                paused: watch::Sender::new(false),
                abort_reason: Mutex::new(None),
                done: watch::Sender::new(None),
            }),
        }
    }

    /// Stop before the next line is sent
    ///
    /// A line already in flight is still awaited.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.paused.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Hold back the next line until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.shared.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.shared.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// End the stream as aborted, e.g. because the session is going away
    pub fn abort(&self, reason: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        {
            let mut slot = self.shared.abort_reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.shared.paused.send_replace(false);
    }

    fn abort_reason(&self) -> Option<String> {
        self.shared.abort_reason.lock().clone()
    }

    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.shared.total
    }

    /// Completion in percent; an empty program is 100% complete
    pub fn progress(&self) -> f64 {
        percent(self.completed(), self.total())
    }

    pub fn is_finished(&self) -> bool {
        self.shared.done.borrow().is_some()
    }

    /// The report, if the stream has ended
    pub fn report(&self) -> Option<StreamReport> {
        self.shared.done.borrow().clone()
    }

    /// Wait for the stream to end
    pub async fn wait(&self) -> StreamReport {
        let mut rx = self.shared.done.subscribe();
        loop {
            if let Some(report) = rx.borrow_and_update().clone() {
                return report;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `shared` is alive
                return StreamReport {
                    outcome: StreamOutcome::Aborted {
                        reason: "stream dropped".to_string(),
                    },
                    completed: self.completed(),
                    total: self.total(),
                };
            }
        }
    }

    async fn wait_while_paused(&self) {
        let mut rx = self.shared.paused.subscribe();
        if rx.wait_for(|paused| !paused).await.is_err() {
            debug!("Pause channel closed");
        }
    }

    fn advance(&self, core: &SessionCore) {
        let completed = self.shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        core.events.publish(ControllerEvent::StreamProgress {
            completed,
            total: self.total(),
            percent: percent(completed, self.total()),
        });
    }

    fn finish(&self, core: &SessionCore, outcome: StreamOutcome) -> StreamReport {
        let report = StreamReport {
            outcome: outcome.clone(),
            completed: self.completed(),
            total: self.total(),
        };
        match &outcome {
            StreamOutcome::Completed => info!("Stream completed ({} lines)", report.total),
            other => warn!("Stream {} at {:.1}%", other, report.progress()),
        }
        core.log.info(format!("Stream {}", outcome));
        self.shared.done.send_replace(Some(report.clone()));
        core.events.publish(ControllerEvent::StreamFinished(outcome));
        report
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("total", &self.total())
            .field("completed", &self.completed())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Starts program streams on a session
pub struct CommandStreamer {
    core: Arc<SessionCore>,
}

impl CommandStreamer {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// Spawn a stream of `lines` and return its handle
    pub fn start(&self, lines: Vec<String>) -> StreamHandle {
        let handle = StreamHandle::new(lines.len());
        let core = self.core.clone();
        let task_handle = handle.clone();
        info!("Streaming {} lines to {}", lines.len(), core.address);
        core.log
            .info(format!("Streaming program ({} lines)", lines.len()));
        core.track_stream(handle.clone());
        tokio::spawn(async move {
            let outcome = run(&core, &lines, &task_handle).await;
            task_handle.finish(&core, outcome);
        });
        handle
    }
}

async fn run(core: &SessionCore, lines: &[String], handle: &StreamHandle) -> StreamOutcome {
    for (index, raw) in lines.iter().enumerate() {
        handle.wait_while_paused().await;
        if let Some(reason) = handle.abort_reason() {
            return StreamOutcome::Aborted { reason };
        }
        if handle.is_cancelled() {
            return StreamOutcome::Cancelled {
                completed: handle.completed(),
            };
        }

        let line_number = index + 1;
        let line = raw.trim();
        if strip_comments(line).trim().is_empty() {
            handle.advance(core);
            continue;
        }

        if core.model.is_alarm_latched() {
            return StreamOutcome::Failed {
                line_number,
                line: line.to_string(),
                message: "machine is in alarm".to_string(),
            };
        }

        match core.execute_line(line, line_number).await {
            Ok(_) => handle.advance(core),
            Err(Error::Controller(ControllerError::CommandRejected { message, .. })) => {
                if core.config.continue_on_nonfatal_error && !core.model.is_alarm_latched() {
                    warn!("Line {} rejected, continuing: {}", line_number, message);
                    core.log.info(format!(
                        "Continuing after error on line {}",
                        line_number
                    ));
                    handle.advance(core);
                } else {
                    return StreamOutcome::Failed {
                        line_number,
                        line: line.to_string(),
                        message,
                    };
                }
            }
            Err(Error::Controller(ControllerError::Timeout { timeout_ms })) => {
                core.log.error(format!(
                    "No acknowledgement for line {} after {} ms",
                    line_number, timeout_ms
                ));
                return StreamOutcome::Failed {
                    line_number,
                    line: line.to_string(),
                    message: format!("no acknowledgement after {} ms", timeout_ms),
                };
            }
            Err(e) if e.is_transport_error() => {
                return StreamOutcome::Aborted {
                    reason: handle.abort_reason().unwrap_or_else(|| e.to_string()),
                };
            }
            Err(e) => {
                return StreamOutcome::Failed {
                    line_number,
                    line: line.to_string(),
                    message: e.to_string(),
                };
            }
        }
    }

    // A disconnect racing the last acknowledgement still counts as aborted
    match handle.abort_reason() {
        Some(reason) => StreamOutcome::Aborted { reason },
        None => StreamOutcome::Completed,
    }
}
