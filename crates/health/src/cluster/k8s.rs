//! [`ClusterState`] backed by the Kubernetes API.
//!
//! Kinds are resolved through discovery at call time, so any resource the
//! API server serves (core, apps, CRDs) can be checked without code changes.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiCapabilities, ApiResource, Scope};
use kube::{Client, Config};
use tracing::{debug, info};

use super::readiness::is_ready;
use super::{
    ClusterError, ClusterState, EndpointProber, ProbeOutcome, Readiness, RemediationError,
};
use crate::catalog::{split_api_version, RemediationAction, ResourceRef, SelectorRef};
use crate::config::ClusterConnection;

/// Map a client error onto the engine's fatal/non-fatal split.
///
/// The API server answering with an error status means it is reachable;
/// anything below HTTP (transport, TLS, auth plumbing) means it is not.
pub(crate) fn classify(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(response) => ClusterError::Query(format!(
            "{} ({} {})",
            response.message, response.code, response.reason
        )),
        kube::Error::SerdeError(e) => ClusterError::Query(format!("malformed response: {e}")),
        other => ClusterError::Connectivity(other.to_string()),
    }
}

/// Cluster state client over a live API server.
#[derive(Clone)]
pub struct KubeClusterState {
    client: Client,
    prober: EndpointProber,
}

impl KubeClusterState {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            prober: EndpointProber::new(),
        }
    }

    /// Build a client from an explicit kubeconfig, or infer one from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig cannot be read or the client cannot be created.
    pub async fn connect(connection: &ClusterConnection) -> Result<Self> {
        let config = match &connection.kubeconfig {
            Some(path) => Self::config_from_file(path, connection.context.clone()).await?,
            None if connection.context.is_some() => {
                let options = KubeConfigOptions {
                    context: connection.context.clone(),
                    ..KubeConfigOptions::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .context("Failed to load kubeconfig context")?
            }
            None => Config::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?,
        };

        info!(cluster_url = %config.cluster_url, "Using Kubernetes API server");
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    async fn config_from_file(path: &Path, context: Option<String>) -> Result<Config> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig from {}", path.display()))?;

        let options = KubeConfigOptions {
            context,
            ..KubeConfigOptions::default()
        };

        Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .context("Failed to create Kubernetes config from kubeconfig")
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Resolve `apiVersion` + `kind` via discovery. `None` means the server
    /// does not serve that kind, e.g. a CRD that is not installed yet.
    pub(crate) async fn resolve(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<Option<(ApiResource, ApiCapabilities)>, ClusterError> {
        let (group, version) = split_api_version(api_version);
        let gvk = GroupVersionKind::gvk(group, version, kind);

        match discovery::pinned_kind(&self.client, &gvk).await {
            Ok(resolved) => Ok(Some(resolved)),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(api_version, kind, "API group not served");
                Ok(None)
            }
            Err(kube::Error::Discovery(e)) => {
                debug!(api_version, kind, error = %e, "Kind not served");
                Ok(None)
            }
            Err(e) => Err(classify(e)),
        }
    }

    /// Dynamic API handle honouring the resource's scope.
    ///
    /// Namespaced kinds without an explicit namespace are listed across all
    /// namespaces when `all_namespaces` is set, otherwise the client's default
    /// namespace is used.
    pub(crate) fn dynamic_api(
        &self,
        resource: &ApiResource,
        capabilities: &ApiCapabilities,
        namespace: Option<&str>,
        all_namespaces: bool,
    ) -> Api<DynamicObject> {
        match (&capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, resource)
            }
            (Scope::Namespaced, None) if !all_namespaces => {
                Api::default_namespaced_with(self.client.clone(), resource)
            }
            _ => Api::all_with(self.client.clone(), resource),
        }
    }

    async fn list(&self, selector: &SelectorRef) -> Result<Vec<DynamicObject>, ClusterError> {
        let Some((resource, capabilities)) =
            self.resolve(&selector.api_version, &selector.kind).await?
        else {
            return Ok(Vec::new());
        };

        let api = self.dynamic_api(
            &resource,
            &capabilities,
            selector.namespace.as_deref(),
            true,
        );

        let mut params = ListParams::default();
        if let Some(labels) = &selector.selector {
            params = params.labels(labels);
        }

        let list = api.list(&params).await.map_err(classify)?;
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterState for KubeClusterState {
    async fn ping(&self) -> Result<(), ClusterError> {
        let version = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| ClusterError::Connectivity(e.to_string()))?;
        debug!(version = %version.git_version, "API server reachable");
        Ok(())
    }

    async fn exists(&self, target: &ResourceRef) -> Result<bool, ClusterError> {
        let Some((resource, capabilities)) =
            self.resolve(&target.api_version, &target.kind).await?
        else {
            return Ok(false);
        };

        let api = self.dynamic_api(&resource, &capabilities, target.namespace.as_deref(), false);
        let found = api.get_opt(&target.name).await.map_err(classify)?;
        Ok(found.is_some())
    }

    async fn count(&self, selector: &SelectorRef) -> Result<u32, ClusterError> {
        let items = self.list(selector).await?;
        Ok(u32::try_from(items.len()).unwrap_or(u32::MAX))
    }

    async fn readiness(&self, selector: &SelectorRef) -> Result<Readiness, ClusterError> {
        let items = self.list(selector).await?;
        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let ready = items
            .iter()
            .filter(|item| is_ready(&selector.kind, &item.data))
            .count();
        Ok(Readiness::new(
            u32::try_from(ready).unwrap_or(u32::MAX),
            total,
        ))
    }

    async fn probe(&self, url: &str, expected_status: u16, timeout: Duration) -> ProbeOutcome {
        self.prober.probe(url, expected_status, timeout).await
    }

    async fn apply(&self, action: &RemediationAction) -> Result<(), RemediationError> {
        self.execute(action).await
    }
}
