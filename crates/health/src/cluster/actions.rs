//! Execution of remediation actions against a live cluster.

use std::process::Stdio;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::k8s::KubeClusterState;
use super::RemediationError;
use crate::catalog::{ActionKind, RemediationAction, WorkloadKind};

/// Field manager recorded on server-side applied objects.
const FIELD_MANAGER: &str = "cto-health";

impl KubeClusterState {
    pub(crate) async fn execute(&self, action: &RemediationAction) -> Result<(), RemediationError> {
        match &action.kind {
            ActionKind::ApplyManifests { paths, inline } => {
                let mut sources = Vec::with_capacity(paths.len() + inline.len());
                for path in paths {
                    let text = tokio::fs::read_to_string(path).await?;
                    sources.push((path.display().to_string(), text));
                }
                for (index, text) in inline.iter().enumerate() {
                    sources.push((format!("inline[{index}]"), text.clone()));
                }
                for (source_name, text) in &sources {
                    self.apply_documents(source_name, text).await?;
                }
                Ok(())
            }
            ActionKind::DeletePods {
                namespace,
                selector,
            } => {
                let pods: Api<Pod> = Api::namespaced(self.client().clone(), namespace);
                pods.delete_collection(
                    &DeleteParams::default(),
                    &ListParams::default().labels(selector),
                )
                .await?;
                info!(namespace = %namespace, selector = %selector, "Deleted pods");
                Ok(())
            }
            ActionKind::RolloutRestart {
                kind,
                name,
                namespace,
            } => {
                let client = self.client().clone();
                match kind {
                    WorkloadKind::Deployment => {
                        Api::<Deployment>::namespaced(client, namespace)
                            .restart(name)
                            .await?;
                    }
                    WorkloadKind::StatefulSet => {
                        Api::<StatefulSet>::namespaced(client, namespace)
                            .restart(name)
                            .await?;
                    }
                    WorkloadKind::DaemonSet => {
                        Api::<DaemonSet>::namespaced(client, namespace)
                            .restart(name)
                            .await?;
                    }
                }
                info!(kind = %kind, name = %name, namespace = %namespace, "Restarted workload");
                Ok(())
            }
            ActionKind::RunCommand {
                program,
                args,
                timeout_secs,
            } => run_command(&action.command(), program, args, *timeout_secs).await,
        }
    }

    /// Server-side apply every document in a multi-document YAML stream.
    async fn apply_documents(&self, source_name: &str, text: &str) -> Result<(), RemediationError> {
        let manifests = parse_manifests(source_name, text)?;

        for manifest in &manifests {
            let (resource, capabilities) = self
                .resolve(&manifest.api_version, &manifest.kind)
                .await
                .map_err(|e| RemediationError::Manifest {
                    source_name: source_name.to_string(),
                    message: e.to_string(),
                })?
                .ok_or_else(|| RemediationError::UnsupportedKind {
                    api_version: manifest.api_version.clone(),
                    kind: manifest.kind.clone(),
                })?;

            let api = self.dynamic_api(
                &resource,
                &capabilities,
                manifest.object.metadata.namespace.as_deref(),
                false,
            );
            api.patch(
                &manifest.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&manifest.object),
            )
            .await?;

            debug!(
                kind = %manifest.kind,
                name = %manifest.name,
                source = %source_name,
                "Applied manifest"
            );
        }

        info!(source = %source_name, documents = manifests.len(), "Applied manifests");
        Ok(())
    }
}

/// One parsed document, with the fields server-side apply needs pulled out.
#[derive(Debug)]
pub(crate) struct Manifest {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub object: DynamicObject,
}

/// Split a YAML stream into manifests. Empty documents are skipped.
pub(crate) fn parse_manifests(
    source_name: &str,
    text: &str,
) -> Result<Vec<Manifest>, RemediationError> {
    let manifest_error = |message: String| RemediationError::Manifest {
        source_name: source_name.to_string(),
        message,
    };

    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value =
            serde_yaml::Value::deserialize(document).map_err(|e| manifest_error(e.to_string()))?;
        if value.is_null() {
            continue;
        }

        let object: DynamicObject =
            serde_yaml::from_value(value).map_err(|e| manifest_error(e.to_string()))?;
        let Some(types) = object.types.clone() else {
            return Err(manifest_error("missing apiVersion or kind".to_string()));
        };
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| manifest_error(format!("{} without metadata.name", types.kind)))?;

        manifests.push(Manifest {
            api_version: types.api_version,
            kind: types.kind,
            name,
            object,
        });
    }
    Ok(manifests)
}

/// Run an external procedure, bounded by `timeout_secs`.
pub(crate) async fn run_command(
    command_line: &str,
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> Result<(), RemediationError> {
    info!(command = %command_line, "Running remediation command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| RemediationError::CommandTimedOut {
            command: command_line.to_string(),
            timeout_secs,
        })??;

    if output.status.success() {
        Ok(())
    } else {
        Err(RemediationError::CommandFailed {
            command: command_line.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
