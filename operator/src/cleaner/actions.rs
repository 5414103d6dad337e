//! Write-phase actions taken by the `Cleaner` reconciler.

use chrono::Utc;
use cleaner_types::{Cleaner, CleanerStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Client;

use crate::util::{Error, patch::patch_status, time::to_jiff};

/// Records a newly computed `nextScheduleTime`, clearing any prior failure.
pub async fn schedule(client: Client, instance: &Cleaner, next_schedule_time: chrono::DateTime<Utc>) -> Result<(), Error> {
    patch_status::<CleanerStatus, Cleaner>(client, instance, |status| {
        status.next_schedule_time = Some(Time(to_jiff(next_schedule_time)));
    })
    .await?;
    Ok(())
}

/// Records a dispatched run's start: advances `lastRunTime`/`nextScheduleTime`.
pub async fn ran(
    client: Client,
    instance: &Cleaner,
    now: chrono::DateTime<Utc>,
    next_schedule_time: chrono::DateTime<Utc>,
) -> Result<(), Error> {
    patch_status::<CleanerStatus, Cleaner>(client, instance, |status| {
        status.last_run_time = Some(Time(to_jiff(now)));
        status.next_schedule_time = Some(Time(to_jiff(next_schedule_time)));
    })
    .await?;
    Ok(())
}

/// Records the prior dispatch's outcome, per the "worker completes" rows of
/// the reconcile state machine.
pub async fn record_outcome(client: Client, instance: &Cleaner, failure_message: Option<String>) -> Result<(), Error> {
    patch_status::<CleanerStatus, Cleaner>(client, instance, |status| {
        status.failure_message = failure_message;
    })
    .await?;
    Ok(())
}
