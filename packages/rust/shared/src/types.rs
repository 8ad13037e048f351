//! Core domain types for enrichment jobs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for enrichment run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// AccountRecord
// ---------------------------------------------------------------------------

/// One account's entry in the job document.
///
/// `description` is absent until the run resolves it; any other fields the
/// submitted document carried are preserved untouched through to the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Resolved profile description. `None` is a terminal empty result once
    /// the run completes.
    #[serde(default)]
    pub description: Option<String>,

    /// Passthrough fields from the submitted document.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// JobDocument / Job
// ---------------------------------------------------------------------------

/// The JSON job document: the accounts mapping plus any passthrough
/// top-level fields. This is exactly what the final snapshot serializes.
///
/// `BTreeMap` keeps account ordering stable so identical documents always
/// produce byte-identical snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    /// Account identifier → record.
    pub accounts: BTreeMap<String, AccountRecord>,

    /// Passthrough top-level fields from the submitted document.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One enrichment run's full input: the evolving document plus the proxy
/// and rotation endpoint it runs under. Owned exclusively by one run task.
#[derive(Debug, Clone)]
pub struct Job {
    /// The job document, mutated in place as descriptions resolve.
    pub document: JobDocument,
    /// Proxy descriptor used for outbound profile fetches.
    pub proxy: String,
    /// Endpoint used to request a new proxy before each batch.
    pub rotation_endpoint: Url,
}
