//! C3: the per-policy action pipeline.
//!
//! Resolves every selector (C2), filters via the script runtime (C1),
//! optionally aggregates, applies the policy's action, then fans out to
//! notifications, disk archival, a `Report` object and metrics.

pub mod notify;
pub mod store;

use std::collections::BTreeMap;

use cleaner_types::{Cleaner, CleanerAction, LabelMap, Report, ReportSpec, ResourceInfo, ResourceRef, labels};
use kube::{
    Api, Client, ResourceExt,
    api::{DeleteParams, DynamicObject, ObjectMeta, Patch, PatchParams, PropagationPolicy},
    core::TypeMeta,
    discovery::ApiResource,
};
use owo_colors::OwoColorize;

use crate::model::ResourceResult;
use crate::resolver::{self, DiscoveryCache};
use crate::script::ScriptRuntime;
use crate::util::{Error, MANAGER_NAME, MultiError};
#[cfg(feature = "metrics")]
use crate::util::metrics;

use self::notify::Notifier;

/// Runs one complete pass of a policy: resolve, filter, aggregate, act,
/// notify, archive, report, record metrics.
pub async fn run(
    client: &Client,
    discovery: &DiscoveryCache,
    script: &dyn ScriptRuntime,
    notifier: &dyn Notifier,
    policy_name: &str,
) -> Result<(), Error> {
    let policies: Api<Cleaner> = Api::all(client.clone());
    let policy = match policies.get_opt(policy_name).await? {
        Some(p) => p,
        None => return Ok(()),
    };

    let mut matched = Vec::new();
    for selector in &policy.spec.resource_selectors {
        let objects = resolver::resolve(client, discovery, selector).await?;
        for object in objects {
            if selector.exclude_deleted && object.metadata.deletion_timestamp.is_some() {
                continue;
            }
            let script_body = selector.evaluate.as_deref().unwrap_or("");
            let (is_match, message) = script.is_match(&object, script_body)?;
            if is_match {
                matched.push(ResourceResult::with_message(object, message));
            }
        }
    }

    if let Some(aggregated) = &policy.spec.aggregated_selection {
        matched = script.aggregated_selection(aggregated, &matched)?;
    }

    let mut errors = MultiError::new();
    let mut processed = Vec::new();

    match policy.spec.action {
        CleanerAction::Delete => {
            for result in matched {
                match delete_one(client, &result, policy.spec.delete_options.as_ref()).await {
                    Ok(_) => processed.push(result),
                    Err(e) => errors.push(e),
                }
            }
        }
        CleanerAction::Transform => {
            let transform_body = policy.spec.transform.as_deref().unwrap_or("");
            for result in matched {
                match transform_one(client, script, transform_body, &result).await {
                    Ok(updated) => processed.push(updated),
                    Err(e) => errors.push(e),
                }
            }
        }
        CleanerAction::Scan => {
            for result in &matched {
                println!(
                    "{}",
                    format!(
                        "  · scan matched {} {}",
                        result
                            .resource
                            .types
                            .as_ref()
                            .map(|t| t.kind.as_str())
                            .unwrap_or("?"),
                        result.resource.name_any()
                    )
                    .cyan()
                );
            }
            processed = matched;
        }
    }

    if let Err(e) = notifier.send(&processed, &policy).await {
        errors.push(Error::Notify(e));
    }

    if let Some(path) = &policy.spec.store_resource_path {
        if let Err(e) = store::store_resources(path, policy_name, &processed) {
            errors.push(Error::Store(e));
        }
    }

    apply_report(client, policy_name, &policy.spec.action, &processed).await?;

    record_metrics(policy_name, &policy.spec.action, &processed, errors.errors.len());

    errors.into_result()
}

async fn delete_one(
    client: &Client,
    result: &ResourceResult,
    delete_options: Option<&cleaner_types::DeleteOptions>,
) -> Result<bool, Error> {
    let (api, name) = dynamic_api_for(client, &result.resource);
    let mut dp = DeleteParams::default();
    if let Some(opts) = delete_options {
        if let Some(grace) = opts.grace_period_seconds {
            dp.grace_period_seconds = Some(grace as u32);
        }
        dp.propagation_policy = match opts.propagation_policy.as_deref() {
            Some("Orphan") => Some(PropagationPolicy::Orphan),
            Some("Background") => Some(PropagationPolicy::Background),
            Some("Foreground") => Some(PropagationPolicy::Foreground),
            _ => None,
        };
    }
    match api.delete(&name, &dp).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
        Err(e) => Err(Error::Kube { source: e }),
    }
}

async fn transform_one(
    client: &Client,
    script: &dyn ScriptRuntime,
    transform_body: &str,
    result: &ResourceResult,
) -> Result<ResourceResult, Error> {
    let transformed = script.transform(&result.resource, transform_body)?;
    let (api, name) = dynamic_api_for(client, &transformed);
    let replaced = api
        .replace(&name, &Default::default(), &transformed)
        .await?;
    Ok(ResourceResult::with_message(replaced, result.message.clone()))
}

fn dynamic_api_for(client: &Client, object: &DynamicObject) -> (Api<DynamicObject>, String) {
    let type_meta = object.types.clone().unwrap_or_default();
    let (group, version) = match type_meta.api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", type_meta.api_version.as_str()),
    };
    let gvk = kube::core::GroupVersionKind::gvk(group, version, &type_meta.kind);
    let plural = format!("{}s", type_meta.kind.to_lowercase());
    let ar = ApiResource::from_gvk_with_plural(&gvk, &plural);
    let name = object.name_any();
    let api = match &object.metadata.namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    };
    (api, name)
}

async fn apply_report(
    client: &Client,
    policy_name: &str,
    action: &CleanerAction,
    processed: &[ResourceResult],
) -> Result<(), Error> {
    if processed.is_empty() {
        return Ok(());
    }

    let resource_info: Vec<ResourceInfo> = processed
        .iter()
        .map(|r| {
            let type_meta = r.resource.types.clone().unwrap_or_default();
            ResourceInfo {
                resource: ResourceRef {
                    api_version: type_meta.api_version,
                    kind: type_meta.kind,
                    namespace: r.resource.metadata.namespace.clone(),
                    name: r.resource.name_any(),
                },
                full_resource: serde_json::to_vec(&r.resource).unwrap_or_default(),
                message: r.message.clone(),
            }
        })
        .collect();

    let mut labels: LabelMap = BTreeMap::new();
    labels.insert(labels::POLICY_NAME.to_string(), policy_name.to_string());
    labels.insert(labels::MANAGED_BY.to_string(), "cleaner-operator".to_string());

    let report = Report {
        metadata: ObjectMeta {
            name: Some(policy_name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: ReportSpec {
            resource_info,
            action: *action,
        },
    };

    let api: Api<Report> = Api::all(client.clone());
    api.patch(
        policy_name,
        &PatchParams::apply(MANAGER_NAME).force(),
        &Patch::Apply(&report),
    )
    .await?;
    Ok(())
}

fn record_metrics(policy_name: &str, action: &CleanerAction, processed: &[ResourceResult], error_count: usize) {
    #[cfg(feature = "metrics")]
    {
        let (deleted, updated, scanned) = match action {
            CleanerAction::Delete => (processed.len() as i64, 0, 0),
            CleanerAction::Transform => (0, processed.len() as i64, 0),
            CleanerAction::Scan => (0, 0, processed.len() as i64),
        };
        for result in processed {
            let type_meta = result.resource.types.clone().unwrap_or_default();
            match action {
                CleanerAction::Delete => metrics::report_deleted(policy_name, &type_meta.api_version, &type_meta.kind),
                CleanerAction::Transform => metrics::report_updated(policy_name, &type_meta.api_version, &type_meta.kind),
                CleanerAction::Scan => metrics::report_scan(policy_name, &type_meta.api_version, &type_meta.kind),
            }
        }
        if error_count > 0 {
            let kind_hint = processed
                .first()
                .and_then(|r| r.resource.types.as_ref())
                .map(|t| (t.api_version.as_str(), t.kind.as_str()))
                .unwrap_or(("", ""));
            for _ in 0..error_count {
                metrics::report_error(policy_name, kind_hint.0, kind_hint.1);
            }
        }
        metrics::set_run_gauges(policy_name, deleted, updated, scanned, error_count as i64);
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = (policy_name, action, processed, error_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_api_for_uses_namespace_when_present() {
        let object = DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".into(),
                kind: "Secret".into(),
            }),
            metadata: ObjectMeta {
                name: Some("s".into()),
                namespace: Some("ns".into()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        };
        assert_eq!(object.metadata.namespace.as_deref(), Some("ns"));
    }
}
