//! Classifies a `kube::runtime::watcher` stream error as transient (resume
//! after backoff) or permanent (drop this kind and stop retrying), per
//! §4.1's "permanent errors for a single kind (e.g., CRD removed): log, drop
//! that kind, continue others." Classification is grounded on
//! `kube::Error::Api`'s stable `code` field rather than on a message string.

use thiserror::Error;

/// Wraps the error a `kube::runtime::watcher` stream yields, adding the
/// permanent/transient distinction the plain `watcher::Error` doesn't carry.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct WatchError(#[from] kube::runtime::watcher::Error);

impl WatchError {
    /// `true` for API responses that will never succeed on retry: the
    /// resource type doesn't exist (`404`, e.g. a CRD that was removed) or
    /// the watcher lacks permission (`403`). Everything else (network
    /// blips, `410 Gone` resync requests, 5xx) is transient and handled by
    /// the caller's backoff-and-resubscribe loop.
    pub fn is_permanent(&self) -> bool {
        self.api_status_code().is_some_and(|code| code == 404 || code == 403)
    }

    fn api_status_code(&self) -> Option<u16> {
        use kube::runtime::watcher::Error as WatcherError;
        let source = match &self.0 {
            WatcherError::InitialListFailed(e) => e,
            WatcherError::WatchFailed(e) => e,
            _ => return None,
        };
        match source {
            kube::Error::Api(resp) => Some(resp.code),
            _ => None,
        }
    }
}
