//! Recorded deployments.
//!
//! A snapshot is a manifest as it was synthesized at a point in time. The
//! latest snapshot for a project/environment pair is what `plan` compares a
//! fresh build against.
//!
//! ```text
//! Deployment ──► Manifest ──► Snapshot ──► StatePersistence (JSON / memory)
//!                    │                              │
//!                    └────────► DiffEngine ◄────────┘
//!                                   │
//!                                   ▼
//!                               PlanReport
//! ```

pub mod diff;
pub mod persistence;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::graph::Manifest;

pub use diff::{ChangeType, DiffEngine, OutputChange, PlanReport, PlanSummary, ResourceChange, StateDiff};
pub use persistence::{JsonPersistence, MemoryPersistence, StatePersistence};

/// Errors raised by the state store
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State persistence error: {0}")]
    Persistence(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StateResult<T> = std::result::Result<T, StateError>;

/// A recorded manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique snapshot id
    pub id: String,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// `{project}-{environment}`
    pub state_key: String,
    /// Fingerprint of the manifest
    pub fingerprint: String,
    /// The recorded manifest
    pub manifest: Manifest,
}

impl Snapshot {
    /// Record `manifest` now
    pub fn new(manifest: Manifest) -> StateResult<Self> {
        let fingerprint = manifest
            .fingerprint()
            .map_err(|e| StateError::Persistence(e.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            state_key: manifest.state_key(),
            fingerprint,
            manifest,
        })
    }

    /// Number of recorded resources
    pub fn resource_count(&self) -> usize {
        self.manifest.resources.len()
    }
}
