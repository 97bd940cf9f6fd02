//! nchat core engine.
//!
//! Provides the protocol contract and message taxonomy every backend
//! implements, the persistent cache store, and shared configuration.
//! The UI Model that ties these together lives in `nchat-tui`.

pub mod cache;
pub mod config;
pub mod data;
pub mod ids;
pub mod protocol;

pub use cache::{Cache, CacheError, SqliteCache};
pub use config::{AppConfig, Config, ConfigError, ExternalConfig, UiConfig};
pub use data::{ChatInfo, ChatMessage, ContactInfo, FileInfo, FileStatus, Reactions, SPONSORED_TIME_SENT};
pub use ids::{ChatId, FileId, MsgId, ProfileId, UserId};
pub use protocol::{DownloadFileAction, FeatureSet, ProfileService, Protocol, ProtocolError, ProtocolFeature, Request, Service, ServiceHandler};
