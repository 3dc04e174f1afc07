//! Segue Core
//!
//! Platform-agnostic media types and collaborator traits shared by the
//! resolver and the playback engine.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Media Types**: `MediaReference`, `ResolvedLocator`, `MediaId`
//! - **Collaborator Traits**: `CacheManager`, `Connectivity`, `ProtocolProxy`
//! - **Resolution Seam**: `LocatorResolver`, implemented by `segue-source`
//! - **Error Handling**: `ProxyError` and `ResolutionError`
//!
//! # Example
//!
//! ```rust
//! use segue_core::{MediaReference, RemoteProtocol};
//!
//! let local = MediaReference::local("/music/song.flac");
//! let remote = MediaReference::remote(RemoteProtocol::CloudDrive, "file-123")
//!     .with_known_size(4_194_304);
//!
//! assert_eq!(remote.media_id().as_str(), "cloud_drive:file-123");
//! assert!(local.is_local());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ProxyError, ResolutionError, Result};
pub use traits::{CacheManager, Connectivity, LocatorResolver, ProtocolProxy};
pub use types::{MediaId, MediaReference, ProxyLocator, RemoteProtocol, ResolvedLocator};
