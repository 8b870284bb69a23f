//! Resource Watcher (§4.1): continuously produces a complete,
//! ordered-within-key stream of [`clustertrace_core::event::Event`]s for
//! every configured Kubernetes kind, surviving API-server disconnects
//! without event loss.

pub mod backoff;
pub mod error;
pub mod mapping;
pub mod watcher;

pub use error::WatchError;
pub use watcher::ResourceWatcher;
