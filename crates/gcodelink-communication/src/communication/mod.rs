//! Transport abstraction
//!
//! A transport opens a duplex byte stream to a controller. The session
//! pipeline only ever sees the two halves of a [`Link`]; closing a link is
//! a `shutdown()` on its outbound half.

pub mod line_buffer;
pub mod simulated;
pub mod tcp;

pub use line_buffer::LineBuffer;

use async_trait::async_trait;
use gcodelink_core::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed inbound half of a link
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed outbound half of a link
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open connection to a controller
pub struct Link {
    pub inbound: BoxedReader,
    pub outbound: BoxedWriter,
    /// Human-readable peer description for logs
    pub peer: String,
}

impl Link {
    pub fn new(
        inbound: impl AsyncRead + Send + Unpin + 'static,
        outbound: impl AsyncWrite + Send + Unpin + 'static,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            inbound: Box::new(inbound),
            outbound: Box::new(outbound),
            peer: peer.into(),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("peer", &self.peer).finish()
    }
}

/// Opens links to controllers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link to `address`
    async fn open(&self, address: &str) -> Result<Link>;

    /// Transport name for logs
    fn name(&self) -> &str;
}
