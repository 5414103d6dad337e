use std::time::Duration;

pub(crate) mod colors;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod patch;
pub(crate) mod time;

pub use error::{Error, MultiError};

/// Backoff applied after a cron-parse failure, so a broken schedule doesn't
/// hammer the API server every reconcile.
pub(crate) const CRON_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Debounce window: a second trigger within this long of the last run is ignored.
pub(crate) const DEBOUNCE_WINDOW: Duration = Duration::from_secs(30);

/// Most missed cron fires tolerated between `earliestTime` and `now` before
/// a policy's schedule is considered broken (clock skew, crashed controller, etc.).
pub(crate) const MAX_MISSED_SCHEDULES: usize = 100;

/// Name of the Kubernetes resource manager used in server-side-apply field managers.
pub(crate) const MANAGER_NAME: &str = const_format::formatcp!("cleaner-operator/{}", env!("CARGO_PKG_VERSION"));
