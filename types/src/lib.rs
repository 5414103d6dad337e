use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a policy's `resourceSelectors` list.
///
/// At most one of `namespace` / `namespace_selector` is expected to be set;
/// if both are present the resolver takes their union (see `cleaner-operator`'s
/// resolver module).
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Selector {
    pub namespace: Option<String>,
    pub namespace_selector: Option<String>,
    pub group: String,
    pub version: String,
    pub kind: String,
    #[serde(default)]
    pub label_filters: Vec<LabelFilter>,
    pub evaluate: Option<String>,
    #[serde(default = "default_true")]
    pub exclude_deleted: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum LabelFilterOperation {
    Equal,
    Different,
    Has,
    DoesNotHave,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct LabelFilter {
    pub key: String,
    pub operation: LabelFilterOperation,
    #[serde(default)]
    pub value: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum CleanerAction {
    #[default]
    Delete,
    Transform,
    Scan,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DeleteOptions {
    pub grace_period_seconds: Option<i64>,
    pub propagation_policy: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct NotificationSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(rename = "ref")]
    pub notification_ref: String,
}

fn default_starting_deadline() -> Option<i64> {
    None
}

/// The `Cleaner` custom resource: one user-declared policy.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "cleaner.projectsveltos.io",
    version = "v1alpha1",
    kind = "Cleaner",
    plural = "cleaners",
    derive = "PartialEq",
    status = "CleanerStatus",
    printcolumn = r#"{"jsonPath": ".status.lastRunTime", "name": "LAST RUN", "type": "date"}"#,
    printcolumn = r#"{"jsonPath": ".status.failureMessage", "name": "FAILURE", "type": "string"}"#
)]
pub struct CleanerSpec {
    #[serde(default)]
    pub resource_selectors: Vec<Selector>,
    pub aggregated_selection: Option<String>,
    #[serde(default)]
    pub action: CleanerAction,
    pub transform: Option<String>,
    pub schedule: String,
    #[serde(default = "default_starting_deadline")]
    pub starting_deadline_seconds: Option<i64>,
    #[serde(default)]
    pub notifications: Vec<NotificationSpec>,
    pub store_resource_path: Option<String>,
    pub delete_options: Option<DeleteOptions>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CleanerStatus {
    #[serde(rename = "nextScheduleTime")]
    pub next_schedule_time: Option<Time>,
    #[serde(rename = "lastRunTime")]
    pub last_run_time: Option<Time>,
    pub failure_message: Option<String>,
}

/// One resource captured by a policy run, as recorded on a `Report`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceInfo {
    pub resource: ResourceRef,
    /// The full object, JSON-serialised then stored as a byte string so the
    /// CRD schema does not have to model every possible resource shape.
    pub full_resource: Vec<u8>,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// The `Report` custom resource: a snapshot of the resources one `Cleaner` run acted upon.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "cleaner.projectsveltos.io",
    version = "v1alpha1",
    kind = "Report",
    plural = "reports",
    derive = "PartialEq"
)]
pub struct ReportSpec {
    #[serde(default)]
    pub resource_info: Vec<ResourceInfo>,
    pub action: CleanerAction,
}

/// Labels applied by this operator to objects it manages directly (the `Report`s it writes).
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const POLICY_NAME: &str = "cleaner.projectsveltos.io/policy";
}

pub type LabelMap = BTreeMap<String, String>;
