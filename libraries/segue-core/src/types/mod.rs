mod media;

pub use media::{MediaId, MediaReference, ProxyLocator, RemoteProtocol, ResolvedLocator};
