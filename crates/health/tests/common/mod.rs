//! In-memory cluster used by the pipeline tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cto_health::catalog::{RemediationAction, ResourceRef, SelectorRef};
use cto_health::cluster::{ProbeOutcome, Readiness, RemediationError};
use cto_health::{ClusterError, ClusterState};

/// What applying an action does to the model.
#[derive(Debug, Clone)]
pub enum Effect {
    Create(String),
    SetCount(String, u32),
    SetReadiness(String, Readiness),
    Fail(String),
}

#[derive(Default)]
struct Model {
    present: HashSet<String>,
    counts: HashMap<String, u32>,
    readiness: HashMap<String, Readiness>,
    probes: HashMap<String, ProbeOutcome>,
    effects: HashMap<String, Vec<Effect>>,
    disconnected: HashSet<String>,
    ping_fails: bool,
    latency: Duration,
    calls: Vec<String>,
}

/// A cluster whose state lives in a mutex-guarded model.
///
/// Resources are keyed by their display form (`"Namespace cto"`), selectors
/// likewise (`"Pod matching app=x in cto"`), and actions by their manual
/// command line.
#[derive(Clone, Default)]
pub struct FakeCluster {
    model: Arc<Mutex<Model>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, key: &str) -> Self {
        self.model.lock().unwrap().present.insert(key.to_string());
        self
    }

    pub fn with_count(self, key: &str, count: u32) -> Self {
        self.model
            .lock()
            .unwrap()
            .counts
            .insert(key.to_string(), count);
        self
    }

    pub fn with_readiness(self, key: &str, ready: u32, total: u32) -> Self {
        self.model
            .lock()
            .unwrap()
            .readiness
            .insert(key.to_string(), Readiness::new(ready, total));
        self
    }

    pub fn with_probe(self, url: &str, outcome: ProbeOutcome) -> Self {
        self.model
            .lock()
            .unwrap()
            .probes
            .insert(url.to_string(), outcome);
        self
    }

    pub fn with_effect(self, command: &str, effect: Effect) -> Self {
        self.model
            .lock()
            .unwrap()
            .effects
            .entry(command.to_string())
            .or_default()
            .push(effect);
        self
    }

    /// Any read touching `key` reports the control plane as unreachable.
    pub fn disconnected_on(self, key: &str) -> Self {
        self.model
            .lock()
            .unwrap()
            .disconnected
            .insert(key.to_string());
        self
    }

    pub fn with_failing_ping(self) -> Self {
        self.model.lock().unwrap().ping_fails = true;
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.model.lock().unwrap().latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.model.lock().unwrap().calls.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Log the call and fail it if its key is disconnected.
    async fn read(&self, call: String, key: &str) -> Result<(), ClusterError> {
        let latency = {
            let mut model = self.model.lock().unwrap();
            model.calls.push(call);
            if model.disconnected.contains(key) {
                return Err(ClusterError::Connectivity("connection refused".into()));
            }
            model.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterState for FakeCluster {
    async fn ping(&self) -> Result<(), ClusterError> {
        let mut model = self.model.lock().unwrap();
        model.calls.push("ping".to_string());
        if model.ping_fails {
            Err(ClusterError::Connectivity("no route to host".into()))
        } else {
            Ok(())
        }
    }

    async fn exists(&self, resource: &ResourceRef) -> Result<bool, ClusterError> {
        let key = resource.to_string();
        self.read(format!("exists:{key}"), &key).await?;
        Ok(self.model.lock().unwrap().present.contains(&key))
    }

    async fn count(&self, selector: &SelectorRef) -> Result<u32, ClusterError> {
        let key = selector.to_string();
        self.read(format!("count:{key}"), &key).await?;
        Ok(self
            .model
            .lock()
            .unwrap()
            .counts
            .get(&key)
            .copied()
            .unwrap_or(0))
    }

    async fn readiness(&self, selector: &SelectorRef) -> Result<Readiness, ClusterError> {
        let key = selector.to_string();
        self.read(format!("readiness:{key}"), &key).await?;
        Ok(self
            .model
            .lock()
            .unwrap()
            .readiness
            .get(&key)
            .copied()
            .unwrap_or_default())
    }

    async fn probe(&self, url: &str, _expected_status: u16, _timeout: Duration) -> ProbeOutcome {
        let mut model = self.model.lock().unwrap();
        model.calls.push(format!("probe:{url}"));
        model
            .probes
            .get(url)
            .cloned()
            .unwrap_or_else(|| ProbeOutcome::Unreachable("connection refused".into()))
    }

    async fn apply(&self, action: &RemediationAction) -> Result<(), RemediationError> {
        let command = action.command();
        let mut model = self.model.lock().unwrap();
        model.calls.push(format!("apply:{command}"));

        let effects = model.effects.get(&command).cloned().unwrap_or_default();
        for effect in effects {
            match effect {
                Effect::Create(key) => {
                    model.present.insert(key);
                }
                Effect::SetCount(key, count) => {
                    model.counts.insert(key, count);
                }
                Effect::SetReadiness(key, readiness) => {
                    model.readiness.insert(key, readiness);
                }
                Effect::Fail(stderr) => {
                    return Err(RemediationError::CommandFailed {
                        command,
                        code: 1,
                        stderr,
                    })
                }
            }
        }
        Ok(())
    }
}
