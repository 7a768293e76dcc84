//! Shadow document contract: events, partial documents, metadata, report writes

mod client;

pub use client::{ReportHandle, ShadowClient, ShadowClientConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Desired power setting for the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

/// Partial shadow document.
///
/// An absent field means "unchanged", never "cleared". Flow, credential and
/// package payloads are opaque to the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowState {
    pub power: Option<PowerState>,
    pub flows: Option<Value>,
    pub creds: Option<Value>,
    pub packages: Option<Value>,
}

/// Update timestamp for one field, epoch milliseconds, monotonically
/// non-decreasing per field as supplied by the source.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FieldMeta {
    pub timestamp: u64,
}

/// Per-field timestamps accompanying a shadow document.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ShadowMetadata {
    pub power: Option<FieldMeta>,
    pub flows: Option<FieldMeta>,
    pub creds: Option<FieldMeta>,
    pub packages: Option<FieldMeta>,
}

/// Connectivity transitions reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    Reconnected,
    Closed,
    Offline,
}

/// Events delivered by the shadow source to the run loop, in delivery order.
#[derive(Debug, Clone)]
pub enum ShadowEvent {
    /// Initial full snapshot of the desired section, at most one per
    /// connection lifecycle.
    Status {
        state: ShadowState,
        meta: ShadowMetadata,
    },
    /// Incremental update carrying only changed fields.
    Delta {
        state: ShadowState,
        meta: ShadowMetadata,
    },
    Connectivity(Connectivity),
}

/// Partial reported-state update pushed back to the shadow service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reported {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flows: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creds: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Value>,
}

impl Reported {
    pub fn power(power: PowerState) -> Self {
        Self {
            power: Some(power),
            ..Self::default()
        }
    }

    pub fn flows(flows: Value) -> Self {
        Self {
            flows: Some(flows),
            ..Self::default()
        }
    }

    pub fn creds(creds: Value) -> Self {
        Self {
            creds: Some(creds),
            ..Self::default()
        }
    }

    pub fn packages(packages: Value) -> Self {
        Self {
            packages: Some(packages),
            ..Self::default()
        }
    }
}

/// Sink for reported-state writes.
///
/// Fire-and-forget: no acknowledgment is required, callers log failures and
/// move on.
#[async_trait]
pub trait ShadowWriter: Send + Sync {
    async fn report(&self, reported: Reported) -> anyhow::Result<()>;
}
