//! Version Ledger
//!
//! Append-only history of a term's content. Entry N holds the full content
//! snapshot as of version N, so the state before any mutation is always the
//! entry preceding the newest one.

use crate::term::{Term, TermContent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One immutable ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub term_id: Uuid,
    pub version_number: i32,
    #[serde(rename = "snapshotJson")]
    pub snapshot: TermContent,
    pub change_note: Option<String>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    /// Hex SHA-256 over the canonical snapshot JSON
    pub checksum: String,
}

impl VersionEntry {
    /// Snapshot the content of `term` at its current version
    pub fn snapshot(term: &Term, change_note: Option<String>, changed_by: impl Into<String>) -> Self {
        Self {
            term_id: term.id,
            version_number: term.version,
            snapshot: term.content.clone(),
            change_note,
            changed_by: changed_by.into(),
            changed_at: term.updated_at,
            checksum: Self::compute_checksum(&term.content),
        }
    }

    /// Compute checksum from snapshot content
    pub fn compute_checksum(content: &TermContent) -> String {
        let mut hasher = Sha256::new();
        // Struct field order is fixed, so the serialization is canonical
        let canonical = serde_json::to_vec(content).unwrap_or_default();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }

    /// Whether the stored checksum still matches the snapshot
    pub fn verify(&self) -> bool {
        self.checksum == Self::compute_checksum(&self.snapshot)
    }
}

/// Lightweight listing row for the history viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version_number: i32,
    pub change_note: Option<String>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub checksum: String,
}

impl From<&VersionEntry> for VersionSummary {
    fn from(entry: &VersionEntry) -> Self {
        Self {
            version_number: entry.version_number,
            change_note: entry.change_note.clone(),
            changed_by: entry.changed_by.clone(),
            changed_at: entry.changed_at,
            checksum: entry.checksum.clone(),
        }
    }
}

/// Check a term's history against its current version number.
///
/// Entries must be ascending, contiguous from 1, checksum-clean, and end at
/// `current_version`.
pub fn check_history(entries: &[VersionEntry], current_version: i32) -> Result<(), String> {
    for (index, entry) in entries.iter().enumerate() {
        let expected = index as i32 + 1;
        if entry.version_number != expected {
            return Err(format!(
                "Ledger gap: expected version {} but found {}",
                expected, entry.version_number
            ));
        }
        if !entry.verify() {
            return Err(format!("Checksum mismatch on version {}", entry.version_number));
        }
    }

    let head = entries.last().map(|e| e.version_number).unwrap_or(0);
    if head != current_version {
        return Err(format!(
            "Term is at version {} but the ledger ends at {}",
            current_version, head
        ));
    }
    Ok(())
}
