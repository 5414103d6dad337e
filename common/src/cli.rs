use clap::Parser;

/// Process-wide flags recognized by the `cleaner-operator` binary.
///
/// Mirrors the flag set a kubebuilder-scaffolded operator exposes, so the
/// same Helm chart / Deployment args line that would configure the original
/// controller-runtime binary works unchanged here.
#[derive(Parser, Debug, Clone)]
pub struct OperatorArgs {
    /// Address the Prometheus `/metrics` endpoint binds to.
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = ":8080")]
    pub metrics_bind_address: String,

    /// Address the `/healthz` and `/readyz` endpoints bind to.
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = ":8081")]
    pub health_probe_bind_address: String,

    /// Number of worker tasks draining the dispatcher's job queue.
    #[arg(long, env = "WORKER_NUMBER", default_value_t = 5)]
    pub worker_number: usize,

    /// Number of policies the reconciler may process concurrently.
    #[arg(long, env = "CONCURRENT_RECONCILES", default_value_t = 10)]
    pub concurrent_reconciles: usize,

    /// Queries-per-second budget for the Kubernetes API client.
    #[arg(long, env = "KUBE_API_QPS", default_value_t = 40)]
    pub kube_api_qps: u32,

    /// Burst budget for the Kubernetes API client.
    #[arg(long, env = "KUBE_API_BURST", default_value_t = 60)]
    pub kube_api_burst: u32,

    /// Reserved for a future admission webhook server (not started by this binary).
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 9443)]
    pub webhook_port: u16,

    /// How often the watch cache performs a full relist, as a human duration (e.g. "10m").
    #[arg(long, env = "SYNC_PERIOD", default_value = "10m")]
    pub sync_period: String,
}
