//! FishFish registry transport
//!
//! The sync cache only needs three things from the remote registry: a session
//! credential, a bulk read of each record family, and a live change stream.
//! [`RegistryApi`] captures exactly that surface so the cache can run against
//! the real HTTP/WebSocket client or the test mock.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{ApiError, Result};

#[cfg(test)]
pub mod mock;
pub mod models;
pub mod rate_limit;
pub mod registry;
pub mod stream;

#[cfg(test)]
pub use mock::MockRegistry;
pub use models::{Credential, Domain, Permission, Url};
pub use registry::RegistryClient;

/// FishFish registry transport trait
#[async_trait]
pub trait RegistryApi: Send + Sync + 'static {
    /// Request a new session credential carrying `permissions`
    async fn request_credential(&self, permissions: &[Permission]) -> Result<Credential>;

    /// Read the complete domain record set
    async fn fetch_domains(&self, credential: &Credential) -> Result<Vec<Domain>>;

    /// Read the complete URL record set
    async fn fetch_urls(&self, credential: &Credential) -> Result<Vec<Url>>;

    /// Open the live change stream, authenticated once with `credential`
    async fn open_stream(&self, credential: &Credential) -> Result<StreamConnection>;
}

/// One data frame received from the change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Incoming frames. The stream ends when the remote closes normally; a
/// transport failure is yielded as the final item.
pub type FrameStream = BoxStream<'static, std::result::Result<StreamFrame, ApiError>>;

/// Write half of a stream connection, used only for liveness
#[async_trait]
pub trait KeepAlive: Send {
    /// Send a small liveness frame
    async fn ping(&mut self) -> Result<()>;

    /// Close the connection with a normal closure
    async fn close(&mut self);
}

/// An open change stream, split so the read loop and the keep-alive task can
/// own their halves independently
pub struct StreamConnection {
    pub frames: FrameStream,
    pub keepalive: Box<dyn KeepAlive>,
}
