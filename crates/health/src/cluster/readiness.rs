//! Per-kind readiness rules for dynamically fetched objects.
//!
//! Objects arrive as untyped JSON (`DynamicObject::data`), so readiness is
//! read straight off `spec`/`status` fields.

use serde_json::Value;

/// Whether a single object counts as ready.
#[must_use]
pub fn is_ready(kind: &str, object: &Value) -> bool {
    match kind {
        "Pod" => pod_ready(object),
        "Deployment" | "StatefulSet" | "ReplicaSet" => replicas_ready(object),
        "DaemonSet" => daemonset_ready(object),
        _ => ["Ready", "Available", "Established"]
            .iter()
            .any(|condition| condition_true(object, condition)),
    }
}

/// A pod is ready when it is running and every readiness condition holds.
fn pod_ready(object: &Value) -> bool {
    let phase = object
        .pointer("/status/phase")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");

    phase == "Running"
        && condition_true(object, "Ready")
        && condition_true(object, "ContainersReady")
}

fn replicas_ready(object: &Value) -> bool {
    let desired = object
        .pointer("/spec/replicas")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    let ready = object
        .pointer("/status/readyReplicas")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    ready >= desired
}

fn daemonset_ready(object: &Value) -> bool {
    let desired = object
        .pointer("/status/desiredNumberScheduled")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let ready = object
        .pointer("/status/numberReady")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    ready >= desired
}

fn condition_true(object: &Value, condition_type: &str) -> bool {
    object
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(condition_type)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}
