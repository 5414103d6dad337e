//! External collaborator (§6.4): archiving a policy run's processed set to disk.

use std::path::{Path, PathBuf};

use kube::ResourceExt;

use crate::model::ResourceResult;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize resource to YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Writes one YAML file per processed resource under
/// `<store_resource_path>/<policy-name>/<namespace>/<kind>/<name>.yaml`,
/// creating parent directories with permission `0o755` and files `0o644`.
///
/// Cluster-scoped resources (no namespace) are written directly under the
/// policy directory, skipping the namespace segment.
pub fn store_resources(
    store_resource_path: &str,
    policy_name: &str,
    processed: &[ResourceResult],
) -> Result<(), StoreError> {
    for result in processed {
        let kind = result
            .resource
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .unwrap_or("Unknown");
        let name = result.resource.name_any();

        let mut dir = Path::new(store_resource_path).join(policy_name);
        if let Some(namespace) = &result.resource.metadata.namespace {
            dir = dir.join(namespace);
        }
        dir = dir.join(kind);

        create_dir_all(&dir)?;

        let file_path = dir.join(format!("{name}.yaml"));
        let mut scrubbed = result.resource.clone();
        scrubbed.metadata.resource_version = None;
        let yaml = serde_yaml::to_string(&scrubbed)?;
        write_file(&file_path, &yaml)?;
    }
    Ok(())
}

fn create_dir_all(dir: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    set_permissions(dir, 0o755);
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<(), StoreError> {
    std::fs::write(path, contents).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    set_permissions(path, 0o644);
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(mode);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::{DynamicObject, ObjectMeta, TypeMeta};

    #[test]
    fn writes_expected_layout() {
        let tmp = tempfile_dir();
        let resource = DynamicObject {
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
        let processed = vec![ResourceResult::new(resource)];
        store_resources(tmp.to_str().unwrap(), "my-policy", &processed).unwrap();

        let expected = tmp.join("my-policy").join("ns").join("Secret").join("s.yaml");
        assert!(expected.exists());
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cleaner-store-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
