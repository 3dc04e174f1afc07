//! Segue Source
//!
//! Resolves opaque media references (local files, cloud-drive files,
//! IM attachments, partially cached downloads) into locators the playback
//! engine can open.
//!
//! # Features
//!
//! - **Local fast path**: fully downloaded remote media plays from disk
//! - **Offline detection**: blocked playback is reported once to the UI layer
//! - **Proxy start-up wait**: bounded wait for a proxy that is still starting
//! - **Auth retry**: bounded session refresh on authorization failures
//! - **Short-TTL memo**: repeated speculative resolutions stay cheap
//!
//! # Example
//!
//! ```ignore
//! use segue_source::{MediaResolver, ResolverConfig};
//! use segue_core::{MediaReference, RemoteProtocol};
//!
//! let resolver = MediaResolver::builder(cache, connectivity)
//!     .proxy(RemoteProtocol::CloudDrive, cloud_proxy)
//!     .config(ResolverConfig::default())
//!     .build();
//!
//! let locator = resolver
//!     .resolve(&MediaReference::remote(RemoteProtocol::CloudDrive, "file-1"))
//!     .await?;
//! println!("Opening {}", locator.uri);
//! ```

mod config;
mod memo;
mod resolver;

pub use config::ResolverConfig;
pub use resolver::{MediaResolver, MediaResolverBuilder};

// Re-export the error type callers match on
pub use segue_core::{ResolutionError, Result};
