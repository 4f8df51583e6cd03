//! Declarative check catalog.
//!
//! A catalog is plain data: a list of [`CheckSpec`]s plus the registry of
//! remediation actions they reference. Adding a new expectation means adding
//! an entry, not writing code.

pub mod action;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use action::{ActionKind, RemediationAction, WorkloadKind};

/// Catalog compiled into the binary, used when no `--catalog` is given.
const BUILTIN_CATALOG: &str = include_str!("../../catalog/default.yaml");

/// Errors raised while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate check id: {0}")]
    DuplicateId(String),

    #[error("check {check} references unknown remediation action `{action}`")]
    UnknownAction { check: String, action: String },

    #[error("check {check} has invalid threshold: {reason}")]
    InvalidThreshold { check: String, reason: String },

    #[error("check {check} has invalid endpoint URL {url}")]
    InvalidUrl { check: String, url: String },

    #[error("catalog contains no checks")]
    Empty,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_ratio() -> f64 {
    1.0
}

fn default_expected_status() -> u16 {
    200
}

fn default_probe_timeout() -> u64 {
    5
}

/// A single named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// Absent for cluster-scoped kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {ns}/{}", self.kind, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A set of resources of one kind, optionally narrowed by a label selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectorRef {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl fmt::Display for SelectorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(selector) = &self.selector {
            write!(f, " matching {selector}")?;
        }
        match &self.namespace {
            Some(ns) => write!(f, " in {ns}"),
            None => Ok(()),
        }
    }
}

/// Split an `apiVersion` into `(group, version)`; the core group is empty.
#[must_use]
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.split_once('/').unwrap_or(("", api_version))
}

/// The expectation a check verifies, together with its target and threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// The named resource exists.
    Existence { resource: ResourceRef },
    /// At least `min` resources match the selector.
    MinimumCount { selector: SelectorRef, min: u32 },
    /// At least `ratio` of the matching resources are ready, and there is at least one.
    ReadinessFraction {
        selector: SelectorRef,
        #[serde(default = "default_ratio")]
        ratio: f64,
    },
    /// An HTTP endpoint answers with the expected status within the timeout.
    EndpointReachable {
        url: String,
        #[serde(default = "default_expected_status")]
        expected_status: u16,
        #[serde(default = "default_probe_timeout")]
        timeout_secs: u64,
    },
}

impl CheckKind {
    /// Short name used in logs and listings.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Existence { .. } => "existence",
            Self::MinimumCount { .. } => "minimum-count",
            Self::ReadinessFraction { .. } => "readiness",
            Self::EndpointReachable { .. } => "endpoint",
        }
    }

    /// Endpoint checks only warn: external dependencies may legitimately be
    /// offline while the platform is being set up.
    #[must_use]
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::EndpointReachable { .. })
    }

    /// Namespace of the target, if the check is namespaced.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Existence { resource } => resource.namespace.as_deref(),
            Self::MinimumCount { selector, .. } | Self::ReadinessFraction { selector, .. } => {
                selector.namespace.as_deref()
            }
            Self::EndpointReachable { .. } => None,
        }
    }
}

/// Reference from a check to a registry action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remediation {
    /// Name of the action in the catalog's `actions` map.
    pub action: String,
    /// What applying the action does, shown to operators.
    pub description: String,
}

/// The declarative unit of verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tier: u32,
    #[serde(rename = "check")]
    pub kind: CheckKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
}

/// Narrows a catalog to the checks an operator asked for.
#[derive(Debug, Clone, Default)]
pub struct CheckFilter {
    pub ids: Vec<String>,
    pub tiers: Vec<u32>,
    pub namespace: Option<String>,
}

impl CheckFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.tiers.is_empty() && self.namespace.is_none()
    }

    #[must_use]
    pub fn matches(&self, spec: &CheckSpec) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&spec.id) {
            return false;
        }
        if !self.tiers.is_empty() && !self.tiers.contains(&spec.tier) {
            return false;
        }
        match &self.namespace {
            Some(ns) => spec.kind.namespace() == Some(ns.as_str()),
            None => true,
        }
    }
}

/// A full set of checks plus the actions they can invoke.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub actions: BTreeMap<String, RemediationAction>,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

impl Catalog {
    /// Parse and validate a catalog from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_yaml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Read, parse and validate a catalog file.
    ///
    /// Relative manifest paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut catalog = Self::from_yaml(&text)?;
        if let Some(base) = path.parent() {
            catalog.resolve_paths(base);
        }
        Ok(catalog)
    }

    /// Anchor every relative `apply_manifests` path at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for action in self.actions.values_mut() {
            if let ActionKind::ApplyManifests { paths, .. } = &mut action.kind {
                for path in paths.iter_mut().filter(|p| p.is_relative()) {
                    *path = base.join(&*path);
                }
            }
        }
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    /// Check structural invariants: unique ids, resolvable actions, sane thresholds.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.checks.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for spec in &self.checks {
            if !seen.insert(spec.id.as_str()) {
                return Err(CatalogError::DuplicateId(spec.id.clone()));
            }

            if let Some(remediation) = &spec.remediation {
                if !self.actions.contains_key(&remediation.action) {
                    return Err(CatalogError::UnknownAction {
                        check: spec.id.clone(),
                        action: remediation.action.clone(),
                    });
                }
            }

            match &spec.kind {
                CheckKind::ReadinessFraction { ratio, .. } if !(*ratio > 0.0 && *ratio <= 1.0) => {
                    return Err(CatalogError::InvalidThreshold {
                        check: spec.id.clone(),
                        reason: format!("ratio {ratio} must be in (0, 1]"),
                    });
                }
                CheckKind::EndpointReachable {
                    url, timeout_secs, ..
                } => {
                    if reqwest::Url::parse(url).is_err() {
                        return Err(CatalogError::InvalidUrl {
                            check: spec.id.clone(),
                            url: url.clone(),
                        });
                    }
                    if *timeout_secs == 0 {
                        return Err(CatalogError::InvalidThreshold {
                            check: spec.id.clone(),
                            reason: "probe timeout must be at least one second".to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Keep only the checks matching `filter`. Actions are kept as-is.
    #[must_use]
    pub fn filtered(&self, filter: &CheckFilter) -> Self {
        Self {
            actions: self.actions.clone(),
            checks: self
                .checks
                .iter()
                .filter(|spec| filter.matches(spec))
                .cloned()
                .collect(),
        }
    }

    /// Checks grouped by tier in ascending tier order, catalog order within a tier.
    #[must_use]
    pub fn tiers(&self) -> Vec<(u32, Vec<&CheckSpec>)> {
        let mut tiers: BTreeMap<u32, Vec<&CheckSpec>> = BTreeMap::new();
        for spec in &self.checks {
            tiers.entry(spec.tier).or_default().push(spec);
        }
        tiers.into_iter().collect()
    }

    #[must_use]
    pub fn action(&self, name: &str) -> Option<&RemediationAction> {
        self.actions.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE: &str = r"
actions:
  create-sa:
    type: apply_manifests
    inline:
      - |
        apiVersion: v1
        kind: ServiceAccount
        metadata:
          name: controller
          namespace: cto
checks:
  - id: workload-ready
    description: Controller pods ready
    tier: 2
    check:
      type: readiness_fraction
      selector:
        kind: Pod
        namespace: cto
        selector: app=controller
  - id: controller-sa
    description: Controller service account
    tier: 1
    check:
      type: existence
      resource:
        kind: ServiceAccount
        name: controller
        namespace: cto
    remediation:
      action: create-sa
      description: Create the controller service account
  - id: argocd
    description: ArgoCD reachable
    tier: 2
    check:
      type: endpoint_reachable
      url: http://argocd-server.argocd.svc/healthz
";

    #[test]
    fn test_parse_sample_catalog() {
        let catalog = Catalog::from_yaml(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.action("create-sa").is_some());

        let ready = &catalog.checks[0];
        assert_eq!(
            ready.kind,
            CheckKind::ReadinessFraction {
                selector: SelectorRef {
                    api_version: "v1".to_string(),
                    kind: "Pod".to_string(),
                    namespace: Some("cto".to_string()),
                    selector: Some("app=controller".to_string()),
                },
                ratio: 1.0,
            }
        );

        match &catalog.checks[2].kind {
            CheckKind::EndpointReachable {
                expected_status,
                timeout_secs,
                ..
            } => {
                assert_eq!(*expected_status, 200);
                assert_eq!(*timeout_secs, 5);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(catalog.checks[2].kind.is_advisory());
    }

    #[test]
    fn test_tiers_are_ordered() {
        let catalog = Catalog::from_yaml(SAMPLE).unwrap();
        let tiers = catalog.tiers();
        let order: Vec<(u32, Vec<&str>)> = tiers
            .iter()
            .map(|(tier, specs)| (*tier, specs.iter().map(|s| s.id.as_str()).collect()))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, vec!["controller-sa"]),
                (2, vec!["workload-ready", "argocd"]),
            ]
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r"
checks:
  - id: a
    description: first
    check: { type: existence, resource: { kind: Namespace, name: cto } }
  - id: a
    description: second
    check: { type: existence, resource: { kind: Namespace, name: argocd } }
";
        let err = Catalog::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = r"
checks:
  - id: ns
    description: namespace
    check: { type: existence, resource: { kind: Namespace, name: cto } }
    remediation: { action: missing, description: nothing }
";
        let err = Catalog::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownAction { action, .. } if action == "missing"));
    }

    #[test]
    fn test_bad_ratio_rejected() {
        let yaml = r"
checks:
  - id: pods
    description: pods
    check:
      type: readiness_fraction
      ratio: 1.5
      selector: { kind: Pod, namespace: cto }
";
        assert!(matches!(
            Catalog::from_yaml(yaml),
            Err(CatalogError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_bad_url_rejected() {
        let yaml = r"
checks:
  - id: ep
    description: endpoint
    check: { type: endpoint_reachable, url: 'not a url' }
";
        assert!(matches!(
            Catalog::from_yaml(yaml),
            Err(CatalogError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(
            Catalog::from_yaml("checks: []"),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn test_filter_by_tier_and_namespace() {
        let catalog = Catalog::from_yaml(SAMPLE).unwrap();

        let tier_two = catalog.filtered(&CheckFilter {
            tiers: vec![2],
            ..Default::default()
        });
        assert_eq!(tier_two.len(), 2);

        let in_cto = catalog.filtered(&CheckFilter {
            namespace: Some("cto".to_string()),
            ..Default::default()
        });
        let ids: Vec<_> = in_cto.checks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["workload-ready", "controller-sa"]);

        let by_id = catalog.filtered(&CheckFilter {
            ids: vec!["argocd".to_string()],
            ..Default::default()
        });
        assert_eq!(by_id.checks[0].id, "argocd");
    }

    #[test]
    fn test_load_resolves_manifest_paths_against_catalog_dir() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.yaml");
        std::fs::write(
            &catalog_path,
            r"
actions:
  install-crds:
    type: apply_manifests
    paths:
      - crds/coderun.yaml
      - /etc/cto/rbac.yaml
checks:
  - id: crd
    description: CRD installed
    check:
      type: existence
      resource:
        kind: CustomResourceDefinition
        name: coderuns.agents.platform
    remediation:
      action: install-crds
      description: Install CRDs
",
        )
        .unwrap();

        let catalog = Catalog::load(&catalog_path).unwrap();
        let action = catalog.action("install-crds").unwrap();
        let ActionKind::ApplyManifests { paths, .. } = &action.kind else {
            panic!("expected apply_manifests");
        };
        assert_eq!(paths[0], dir.path().join("crds/coderun.yaml"));
        assert_eq!(paths[1], PathBuf::from("/etc/cto/rbac.yaml"));
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        // Prerequisites must come before the workloads that consume them.
        let tiers = catalog.tiers();
        assert!(tiers.len() > 1);
        assert!(tiers.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("v1"), ("", "v1"));
        assert_eq!(split_api_version("apps/v1"), ("apps", "v1"));
        assert_eq!(
            split_api_version("agents.platform/v1"),
            ("agents.platform", "v1")
        );
    }

    #[test]
    fn test_display_targets() {
        let resource = ResourceRef {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            name: "github-app".to_string(),
            namespace: Some("cto".to_string()),
        };
        assert_eq!(resource.to_string(), "Secret cto/github-app");

        let selector = SelectorRef {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            namespace: Some("cto".to_string()),
            selector: Some("app=tools".to_string()),
        };
        assert_eq!(selector.to_string(), "Pod matching app=tools in cto");
    }
}
