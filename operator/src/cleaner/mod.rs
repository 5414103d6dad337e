//! C5: the `Cleaner` cron scheduler and its `kube::runtime::Controller` wiring.

mod actions;
pub mod schedule;

pub mod reconcile;
