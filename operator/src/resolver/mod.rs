//! C2: maps a `Selector`'s (group, version, kind) to a concrete resource and
//! lists the objects it matches across one or more namespaces.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cleaner_types::Selector;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    Api, Client, ResourceExt,
    api::{DynamicObject, ListParams},
    discovery::{ApiResource, Discovery},
};
use owo_colors::OwoColorize;
use tokio::sync::Mutex;

use crate::util::Error;

/// How long a discovery snapshot is trusted before being rebuilt. Discovery
/// round trips dominate latency for selector-heavy policies, so a short-lived
/// process-wide cache is worth the staleness risk (a newly-installed CRD may
/// take up to this long to be resolvable).
const DISCOVERY_TTL: Duration = Duration::from_secs(60);

/// Process-wide cache of the cluster's discovery document.
///
/// Rebuilt lazily on first use and whenever stale; shared by every resolver
/// call so a policy with many selectors doesn't refetch discovery once per
/// selector.
#[derive(Default)]
pub struct DiscoveryCache {
    inner: Mutex<Option<(Instant, Arc<Discovery>)>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, client: &Client) -> Result<Arc<Discovery>, Error> {
        let mut guard = self.inner.lock().await;
        if let Some((fetched_at, discovery)) = guard.as_ref() {
            if fetched_at.elapsed() < DISCOVERY_TTL {
                return Ok(discovery.clone());
            }
        }
        let discovery = Discovery::new(client.clone()).run().await?;
        let discovery = Arc::new(discovery);
        *guard = Some((Instant::now(), discovery.clone()));
        Ok(discovery)
    }
}

fn find_api_resource(discovery: &Discovery, group: &str, version: &str, kind: &str) -> Option<ApiResource> {
    let api_group = discovery.groups().find(|g| g.name() == group)?;
    api_group
        .versioned_resources(version)
        .into_iter()
        .find(|(ar, _)| ar.kind == kind)
        .map(|(ar, _)| ar)
}

fn build_label_selector(selector: &Selector) -> Option<String> {
    use cleaner_types::LabelFilterOperation::*;

    if selector.label_filters.is_empty() {
        return None;
    }
    let parts: Vec<String> = selector
        .label_filters
        .iter()
        .map(|f| match f.operation {
            Equal => format!("{}={}", f.key, f.value),
            Different => format!("{}!={}", f.key, f.value),
            Has => f.key.clone(),
            DoesNotHave => format!("!{}", f.key),
        })
        .collect();
    Some(parts.join(","))
}

/// Expands `namespace`/`namespace_selector` into a concrete, deduplicated set
/// of namespace names. `None` means "cluster-scoped or all namespaces".
async fn expand_namespaces(client: &Client, selector: &Selector) -> Result<Option<Vec<String>>, Error> {
    if selector.namespace.is_none() && selector.namespace_selector.is_none() {
        return Ok(None);
    }

    let mut names: HashSet<String> = HashSet::new();

    if let Some(label_selector) = &selector.namespace_selector {
        let api: Api<Namespace> = Api::all(client.clone());
        let lp = ListParams::default().labels(label_selector);
        for ns in api.list(&lp).await? {
            if ns.metadata.deletion_timestamp.is_some() {
                continue;
            }
            names.insert(ns.name_any());
        }
    }

    if let Some(namespace) = &selector.namespace {
        let api: Api<Namespace> = Api::all(client.clone());
        match api.get_opt(namespace).await? {
            Some(ns) if ns.metadata.deletion_timestamp.is_none() => {
                names.insert(namespace.clone());
            }
            _ => {}
        }
    }

    Ok(Some(names.into_iter().collect()))
}

/// Resolves and lists every object matching `selector`.
///
/// A selector whose (group, version, kind) is unknown to the cluster yields
/// an empty list, not an error — the policy author may be targeting a CRD
/// that simply isn't installed on this cluster yet.
pub async fn resolve(
    client: &Client,
    discovery: &DiscoveryCache,
    selector: &Selector,
) -> Result<Vec<DynamicObject>, Error> {
    let discovery = discovery.get(client).await?;
    let Some(api_resource) = find_api_resource(&discovery, &selector.group, &selector.version, &selector.kind)
    else {
        println!(
            "{}",
            format!(
                "  ⚠ no resource registered for {}/{} {} — skipping selector",
                selector.group, selector.version, selector.kind
            )
            .yellow()
        );
        return Ok(Vec::new());
    };

    let namespaces = expand_namespaces(client, selector).await?;
    let label_selector = build_label_selector(selector);
    let mut lp = ListParams::default();
    if let Some(ls) = &label_selector {
        lp = lp.labels(ls);
    }

    let mut results = Vec::new();
    match namespaces {
        None => {
            let api: Api<DynamicObject> = Api::all_with(client.clone(), &api_resource);
            results.extend(api.list(&lp).await?.items);
        }
        Some(namespaces) => {
            for namespace in namespaces {
                let api: Api<DynamicObject> =
                    Api::namespaced_with(client.clone(), &namespace, &api_resource);
                results.extend(api.list(&lp).await?.items);
            }
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleaner_types::{LabelFilter, LabelFilterOperation};

    fn selector_with_filters(filters: Vec<LabelFilter>) -> Selector {
        Selector {
            namespace: None,
            namespace_selector: None,
            group: String::new(),
            version: "v1".into(),
            kind: "Secret".into(),
            label_filters: filters,
            evaluate: None,
            exclude_deleted: true,
        }
    }

    #[test]
    fn no_filters_means_no_label_selector() {
        assert_eq!(build_label_selector(&selector_with_filters(vec![])), None);
    }

    #[test]
    fn filters_join_by_operation() {
        let filters = vec![
            LabelFilter {
                key: "a".into(),
                operation: LabelFilterOperation::Equal,
                value: "1".into(),
            },
            LabelFilter {
                key: "b".into(),
                operation: LabelFilterOperation::Different,
                value: "2".into(),
            },
            LabelFilter {
                key: "c".into(),
                operation: LabelFilterOperation::Has,
                value: String::new(),
            },
            LabelFilter {
                key: "d".into(),
                operation: LabelFilterOperation::DoesNotHave,
                value: String::new(),
            },
        ];
        assert_eq!(
            build_label_selector(&selector_with_filters(filters)).unwrap(),
            "a=1,b!=2,c,!d"
        );
    }
}
