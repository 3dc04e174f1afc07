//! Media references and the locators they resolve to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identity of a piece of media inside a queue
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    /// Create a new media ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote protocols that can back a cached media reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteProtocol {
    /// File stored on a cloud drive
    CloudDrive,

    /// Audio attached to an instant-messaging conversation
    ImAttachment,

    /// Partially downloaded file served from the local cache
    PartialCache,
}

impl RemoteProtocol {
    /// Scheme-like name used in media IDs and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteProtocol::CloudDrive => "cloud_drive",
            RemoteProtocol::ImAttachment => "im_attachment",
            RemoteProtocol::PartialCache => "partial_cache",
        }
    }
}

impl fmt::Display for RemoteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to playable media
///
/// Created when a queue entry is built and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaReference {
    /// File on the local filesystem
    Local { path: PathBuf },

    /// Remote file that may be (partially) cached locally
    RemoteCached {
        protocol: RemoteProtocol,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        known_size: Option<u64>,
    },
}

impl MediaReference {
    /// Reference a local file
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Reference a remote file
    pub fn remote(protocol: RemoteProtocol, id: impl Into<String>) -> Self {
        Self::RemoteCached {
            protocol,
            id: id.into(),
            known_size: None,
        }
    }

    /// Attach a byte size reported by whoever built the reference
    #[must_use]
    pub fn with_known_size(self, size: u64) -> Self {
        match self {
            Self::RemoteCached { protocol, id, .. } => Self::RemoteCached {
                protocol,
                id,
                known_size: Some(size),
            },
            local @ Self::Local { .. } => local,
        }
    }

    /// Derive the media ID used by queues and swap bookkeeping
    ///
    /// `Local` references use the path, remote ones `"{protocol}:{id}"`.
    pub fn media_id(&self) -> MediaId {
        match self {
            Self::Local { path } => MediaId::new(path.to_string_lossy()),
            Self::RemoteCached { protocol, id, .. } => MediaId::new(format!("{protocol}:{id}")),
        }
    }

    /// Protocol of a remote reference
    pub fn protocol(&self) -> Option<RemoteProtocol> {
        match self {
            Self::Local { .. } => None,
            Self::RemoteCached { protocol, .. } => Some(*protocol),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    pub fn known_size(&self) -> Option<u64> {
        match self {
            Self::Local { .. } => None,
            Self::RemoteCached { known_size, .. } => *known_size,
        }
    }
}

/// Locator handed back by a protocol proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyLocator {
    /// URI the engine should open
    pub uri: String,

    /// Whether the proxy honours range requests
    pub supports_range: bool,

    /// Byte length, if the proxy knows it yet
    pub content_length: Option<u64>,
}

/// Concrete, playback-ready locator
///
/// Short-lived: recomputed on each resolution because remote availability
/// can change between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLocator {
    /// URI or filesystem path the engine should open
    pub uri: String,

    /// Supports random access / range requests
    pub random_access: bool,

    /// Points at a file on the local filesystem
    pub local_file: bool,

    /// Total byte length, when known
    pub content_length: Option<u64>,
}

impl ResolvedLocator {
    /// Locator for a file on disk
    pub fn local(path: &Path) -> Self {
        Self {
            uri: path.to_string_lossy().into_owned(),
            random_access: true,
            local_file: true,
            content_length: None,
        }
    }

    /// Locator served by a remote proxy
    pub fn remote(uri: impl Into<String>, random_access: bool, content_length: Option<u64>) -> Self {
        Self {
            uri: uri.into(),
            random_access,
            local_file: false,
            content_length,
        }
    }

    #[must_use]
    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }
}
