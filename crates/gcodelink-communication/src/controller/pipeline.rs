//! Outbound write path and acknowledgement matching
//!
//! Two locks guard a connection:
//! - the writer lock, held only while one whole line or one realtime byte
//!   is written, so status polls and feed holds can slip in between lines;
//! - the transaction lock, held from sending an acknowledged line until its
//!   terminal response arrives, so at most one such line is outstanding no
//!   matter who sent it.

use crate::communication::BoxedWriter;
use gcodelink_core::{ControllerError, Result, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Terminal response to an acknowledged line, as routed by the reader task
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Ok,
    Error { code: Option<u32>, text: String },
    Alarm { code: u32, text: String },
    /// The controller restarted; nothing in flight will be answered
    Reset,
}

pub(crate) type ReplySender = mpsc::UnboundedSender<Reply>;

pub(crate) struct Pipeline {
    writer: Mutex<Option<BoxedWriter>>,
    replies: Mutex<mpsc::UnboundedReceiver<Reply>>,
    reset_requested: AtomicBool,
}

impl Pipeline {
    /// Wrap the outbound half of a link; the returned sender feeds replies
    pub(crate) fn new(writer: BoxedWriter) -> (Self, ReplySender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                writer: Mutex::new(Some(writer)),
                replies: Mutex::new(rx),
                reset_requested: AtomicBool::new(false),
            },
            tx,
        )
    }

    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;
        result.map_err(|e| {
            TransportError::WriteFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Write one realtime byte without waiting for any response
    pub(crate) async fn write_realtime(&self, byte: u8) -> Result<()> {
        trace!("Realtime byte 0x{:02x}", byte);
        self.write_bytes(&[byte]).await
    }

    /// Note that a soft reset is on its way to the controller
    pub(crate) fn mark_reset(&self) {
        self.reset_requested.store(true, Ordering::SeqCst);
    }

    /// Whether a banner answers a reset we asked for
    ///
    /// Banners sent unprompted, e.g. right after connecting, return `false`.
    pub(crate) fn take_reset(&self) -> bool {
        self.reset_requested.swap(false, Ordering::SeqCst)
    }

    /// Take the transaction lock
    pub(crate) async fn begin(&self) -> Transaction<'_> {
        Transaction {
            pipeline: self,
            replies: self.replies.lock().await,
        }
    }

    /// Shut the outbound half down; later writes fail with `NotConnected`
    pub(crate) async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error shutting down link: {}", e);
            }
        }
    }
}

/// Exclusive right to have one line outstanding
pub(crate) struct Transaction<'a> {
    pipeline: &'a Pipeline,
    replies: MutexGuard<'a, mpsc::UnboundedReceiver<Reply>>,
}

impl Transaction<'_> {
    /// Send `line` and wait for its terminal response
    ///
    /// Replies left over from an earlier timed-out line are discarded
    /// first.
    pub(crate) async fn exchange(&mut self, line: &str, timeout: Duration) -> Result<Reply> {
        while let Ok(stale) = self.replies.try_recv() {
            debug!("Discarding stale reply {:?}", stale);
        }

        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        self.pipeline.write_bytes(framed.as_bytes()).await?;

        match tokio::time::timeout(timeout, self.replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(TransportError::ConnectionLost {
                reason: "inbound stream closed".to_string(),
            }
            .into()),
            Err(_) => Err(ControllerError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_exchange_and_stale_replies() {
        let (client, mut server) = tokio::io::duplex(256);
        let (pipeline, replies) = Pipeline::new(Box::new(client));

        replies.send(Reply::Ok).unwrap();
        let responder = {
            let replies = replies.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 6];
                server.read_exact(&mut buf).await.unwrap();
                replies
                    .send(Reply::Error {
                        code: Some(20),
                        text: "error:20".to_string(),
                    })
                    .unwrap();
                buf
            })
        };

        let reply = pipeline
            .begin()
            .await
            .exchange("G1 X1", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(reply, Reply::Error { code: Some(20), .. }));
        assert_eq!(&responder.await.unwrap(), b"G1 X1\n");
    }

    #[tokio::test]
    async fn test_timeout_and_closed() {
        let (client, _server) = tokio::io::duplex(256);
        let (pipeline, replies) = Pipeline::new(Box::new(client));

        let err = pipeline
            .begin()
            .await
            .exchange("G0 X0", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        drop(replies);
        let err = pipeline
            .begin()
            .await
            .exchange("G0 X0", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_transport_error());

        pipeline.close().await;
        assert!(pipeline.write_realtime(b'?').await.is_err());
    }
}
