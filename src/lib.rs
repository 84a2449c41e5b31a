//! fishsync - a local, continuously synchronized mirror of the FishFish
//! threat registry
//!
//! ```ignore
//! let config = fishsync::Config::load()?;
//! let sync = fishsync::SyncCoordinator::from_config(&config)?;
//! sync.start(config.sync.full_sync_interval()).await?;
//!
//! let verdict = sync.get_domain("fishfish.gg")?;
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;

pub use cache::{SyncCoordinator, SyncReport};
pub use client::models::{Category, Domain, Family, Permission, Url};
pub use client::{RegistryApi, RegistryClient};
pub use config::{Config, SyncSettings};
pub use error::{ApiError, ConfigError, Error, ErrorClass, Result};
