//! C4: the process-wide work dispatcher.
//!
//! Guarantees at most one concurrent execution of the action pipeline per
//! policy name, while coalescing repeat requests that arrive mid-run into a
//! single guaranteed follow-up instead of queuing them individually.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::pipeline::notify::Notifier;
use crate::resolver::DiscoveryCache;
use crate::script::ScriptRuntime;
use crate::util::Error;

/// The outcome of the most recent completed run of a policy, as last
/// observed by a caller of `status`. `status` consumes the entry once read.
pub enum Status {
    Processed,
    InProgress,
    Failed(String),
    Unavailable,
}

#[derive(Default)]
struct State {
    dirty: HashSet<String>,
    in_progress: HashSet<String>,
    job_queue: VecDeque<String>,
    results: HashMap<String, Option<String>>,
}

/// Process singleton. Constructed once at bootstrap and shared via the
/// controller's context; never reconstructed per reconcile.
pub struct Dispatcher {
    state: Mutex<State>,
    client: Client,
    discovery: DiscoveryCache,
    script: Arc<dyn ScriptRuntime>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        client: Client,
        script: Arc<dyn ScriptRuntime>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state: Mutex::new(State::default()),
            client,
            discovery: DiscoveryCache::new(),
            script,
            notifier,
        }
    }

    /// Requests that `name` be processed. Coalesces with any run already in
    /// flight or already queued.
    pub fn submit(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if state.dirty.contains(name) {
            return;
        }
        state.dirty.insert(name.to_string());
        state.results.remove(name);
        if state.in_progress.contains(name) {
            return;
        }
        state.job_queue.push_back(name.to_string());
    }

    /// Reads (and consumes) the last completed outcome for `name`.
    pub fn status(&self, name: &str) -> Status {
        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = state.results.remove(name) {
            return match outcome {
                None => Status::Processed,
                Some(err) => Status::Failed(err),
            };
        }
        if state.in_progress.contains(name) || state.job_queue.iter().any(|n| n == name) {
            return Status::InProgress;
        }
        Status::Unavailable
    }

    /// Removes every trace of `name`, used when its policy is deleted.
    pub fn forget(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.dirty.remove(name);
        state.in_progress.remove(name);
        state.job_queue.retain(|n| n != name);
        state.results.remove(name);
    }

    fn pop_next(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let name = state.job_queue.pop_front()?;
        state.in_progress.insert(name.clone());
        state.dirty.remove(&name);
        Some(name)
    }

    fn complete(&self, name: &str, outcome: Result<(), Error>) {
        let mut state = self.state.lock().unwrap();
        state.in_progress.remove(name);
        state.results.insert(name.to_string(), outcome.err().map(|e| e.to_string()));
        if state.dirty.remove(name) {
            state.job_queue.push_back(name.to_string());
            state.results.remove(name);
        }
    }

    /// Spawns `worker_count` background workers draining `job_queue` until
    /// `shutdown` is cancelled.
    pub fn start(self: &Arc<Self>, worker_count: usize, shutdown: CancellationToken) {
        for _ in 0..worker_count {
            let dispatcher = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                dispatcher.worker_loop(shutdown).await;
            });
        }
    }

    async fn worker_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }

            let Some(name) = self.pop_next() else {
                continue;
            };

            let outcome = crate::pipeline::run(
                &self.client,
                &self.discovery,
                self.script.as_ref(),
                self.notifier.as_ref(),
                &name,
            )
            .await;

            self.complete(&name, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> Mutex<State> {
        Mutex::new(State::default())
    }

    #[test]
    fn submit_then_pop_moves_dirty_to_in_progress() {
        let state = fresh_state();
        {
            let mut s = state.lock().unwrap();
            s.dirty.insert("a".into());
            s.job_queue.push_back("a".into());
        }
        let name = {
            let mut s = state.lock().unwrap();
            let name = s.job_queue.pop_front().unwrap();
            s.in_progress.insert(name.clone());
            s.dirty.remove(&name);
            name
        };
        let s = state.lock().unwrap();
        assert_eq!(name, "a");
        assert!(s.in_progress.contains("a"));
        assert!(!s.dirty.contains("a"));
        assert!(s.job_queue.is_empty());
    }

    #[test]
    fn submit_while_in_progress_does_not_requeue_directly() {
        let state = fresh_state();
        {
            let mut s = state.lock().unwrap();
            s.in_progress.insert("a".into());
        }
        // Mirrors Dispatcher::submit's logic without spinning up a real client.
        let mut s = state.lock().unwrap();
        if !s.dirty.contains("a") {
            s.dirty.insert("a".into());
            s.results.remove("a");
            if !s.in_progress.contains("a") {
                s.job_queue.push_back("a".into());
            }
        }
        assert!(s.dirty.contains("a"));
        assert!(s.job_queue.is_empty(), "a busy policy must not be queued twice");
    }

    #[test]
    fn completion_rearms_exactly_once_when_dirty() {
        let state = fresh_state();
        {
            let mut s = state.lock().unwrap();
            s.in_progress.insert("a".into());
            s.dirty.insert("a".into());
        }
        let mut s = state.lock().unwrap();
        s.in_progress.remove("a");
        s.results.insert("a".to_string(), None);
        if s.dirty.remove("a") {
            s.job_queue.push_back("a".to_string());
            s.results.remove("a");
        }
        assert_eq!(s.job_queue.len(), 1);
        assert!(!s.results.contains_key("a"));
    }

    #[test]
    fn status_consumes_result_once() {
        let state = fresh_state();
        {
            let mut s = state.lock().unwrap();
            s.results.insert("a".to_string(), None);
        }
        let first = state.lock().unwrap().results.remove("a");
        let second = state.lock().unwrap().results.remove("a");
        assert!(first.is_some());
        assert!(second.is_none());
    }
}
