use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use cleaner_types::Cleaner;
use futures::stream::StreamExt;
use kube::{
    Api, ResourceExt,
    client::Client,
    runtime::{
        Controller,
        controller::Action,
        finalizer::{Event as FinalizerEvent, finalizer},
    },
};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{actions, schedule};
use crate::dispatcher::{Dispatcher, Status as DispatchStatus};
use crate::util::{Error, colors::FG2, time::to_chrono};

const FINALIZER_NAME: &str = "cleaner.projectsveltos.io/finalizer";

/// Entrypoint for the `Cleaner` controller. Runs leader election before
/// starting the `kube::runtime::Controller`, mirroring how every other
/// controller in this operator arbitrates between replicas.
pub async fn run(client: Client, dispatcher: Arc<Dispatcher>, worker_number: usize) -> Result<(), Error> {
    println!("{}", "⚙️ Starting Cleaner controller...".green());

    let context: Arc<ContextData> = Arc::new(ContextData { client: client.clone(), dispatcher: dispatcher.clone() });

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("cleaner-controller-{}", uuid::Uuid::new_v4()));
    let lease_name = "cleaner-controller-lock".to_string();
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name,
            lease_ttl,
        },
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        cleaner_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });

    dispatcher.start(worker_number, shutdown.clone());
    cleaner_common::signal_ready();

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                break Ok(())
            },
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                    eprintln!("aborted controller due to leader election error");
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                println!("{}", "👑 Acquired leadership; starting Cleaner controller".green());
                let context_for_controller = context.clone();
                let crd_api: Api<Cleaner> = Api::all(client.clone());
                controller_task = Some(tokio::spawn(async move {
                    Controller::new(crd_api, Default::default())
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping Cleaner controller");
            task.abort();
        }
    }
}

struct ContextData {
    client: Client,
    dispatcher: Arc<Dispatcher>,
}

async fn reconcile(instance: Arc<Cleaner>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let api: Api<Cleaner> = Api::all(client.clone());

    finalizer(&api, FINALIZER_NAME, instance, |event| async move {
        match event {
            FinalizerEvent::Apply(instance) => apply(client, context.clone(), instance.as_ref()).await,
            FinalizerEvent::Cleanup(instance) => cleanup(context.clone(), instance.as_ref()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

async fn cleanup(context: Arc<ContextData>, instance: &Cleaner) -> Result<Action, Error> {
    let name = instance.name_any();
    context.dispatcher.forget(&name);
    println!("{}", format!("🗑 Cleaner {} removed; forgotten by dispatcher", name.color(FG2)).yellow());
    Ok(Action::await_change())
}

async fn apply(client: Client, context: Arc<ContextData>, instance: &Cleaner) -> Result<Action, Error> {
    let name = instance.name_any();

    // Consume any outcome left by the dispatcher since the last tick before
    // computing this tick's schedule decision, per the reconcile state machine.
    match context.dispatcher.status(&name) {
        DispatchStatus::Processed => {
            actions::record_outcome(client.clone(), instance, None).await?;
        }
        DispatchStatus::Failed(err) => {
            eprintln!("{}", format!("Cleaner {name} run failed: {err}").red());
            actions::record_outcome(client.clone(), instance, Some(err)).await?;
        }
        DispatchStatus::InProgress | DispatchStatus::Unavailable => {}
    }

    let cron = match schedule::parse(&instance.spec.schedule) {
        Ok(c) => c,
        Err(e) => {
            actions::record_outcome(client.clone(), instance, Some(e.to_string())).await?;
            return Ok(Action::requeue(crate::util::CRON_ERROR_BACKOFF));
        }
    };
    let now = Utc::now();
    let earliest = instance
        .status
        .as_ref()
        .and_then(|s| s.last_run_time.as_ref())
        .map(|t| to_chrono(t.0))
        .unwrap_or_else(|| instance.creation_timestamp().map(|t| to_chrono(t.0)).unwrap_or(now));
    let starting_deadline = instance
        .spec
        .starting_deadline_seconds
        .map(chrono::Duration::seconds);
    let next_schedule_time = instance.status.as_ref().and_then(|s| s.next_schedule_time.as_ref()).map(|t| t.0);
    let last_run_time = instance.status.as_ref().and_then(|s| s.last_run_time.as_ref()).map(|t| t.0);

    let decision = schedule::decide(
        &cron,
        &instance.spec.schedule,
        now,
        earliest,
        starting_deadline,
        next_schedule_time,
        last_run_time,
    );

    let decision = match decision {
        Ok(d) => d,
        Err(e) => {
            actions::record_outcome(client.clone(), instance, Some(e.to_string())).await?;
            return Ok(Action::requeue(crate::util::CRON_ERROR_BACKOFF));
        }
    };

    use schedule::Decision::*;
    let next_run_time = match decision {
        FirstSchedule { next_schedule_time } => {
            actions::schedule(client.clone(), instance, next_schedule_time).await?;
            next_schedule_time
        }
        NotDue { next_schedule_time } => next_schedule_time,
        Debounced { next_schedule_time } => next_schedule_time,
        Due { next_schedule_time } => {
            context.dispatcher.submit(&name);
            actions::ran(client.clone(), instance, now, next_schedule_time).await?;
            next_schedule_time
        }
    };

    let requeue_after = (next_run_time - now)
        .to_std()
        .unwrap_or_default()
        .max(StdDuration::from_millis(100));

    Ok(Action::requeue(requeue_after))
}

fn on_error(instance: Arc<Cleaner>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!("Reconciliation error for {}: {:?}", instance.name_any(), error).red()
    );
    Action::requeue(Duration::from_secs(5))
}
