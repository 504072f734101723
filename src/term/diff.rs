//! Term content diff engine
//!
//! Field-level comparison of two content sets. Drives the proposed-vs-current
//! view for edit proposals, the "approved with edits" audit annotation, and
//! the version history comparison.

use crate::term::{ContentField, TermContent};
use serde::{Deserialize, Serialize};

/// One differing field with both sides rendered as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: ContentField,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// Comparison between two recorded versions of one term
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionComparison {
    pub from_version: i32,
    pub to_version: i32,
    pub changed_fields: Vec<ContentField>,
    pub changes: Vec<FieldChange>,
}

/// The diff engine for term content
pub struct DiffEngine;

impl DiffEngine {
    /// Names of the fields whose values differ, in display order.
    ///
    /// List fields compare element-wise: order matters because the UI renders
    /// examples and synonyms in the order they were written.
    pub fn changed_fields(base: &TermContent, candidate: &TermContent) -> Vec<ContentField> {
        ContentField::ALL
            .into_iter()
            .filter(|field| !Self::field_eq(base, candidate, *field))
            .collect()
    }

    /// Differing fields with their before/after values
    pub fn compare(base: &TermContent, candidate: &TermContent) -> Vec<FieldChange> {
        Self::changed_fields(base, candidate)
            .into_iter()
            .map(|field| FieldChange {
                field,
                before: base.field_value(field),
                after: candidate.field_value(field),
            })
            .collect()
    }

    fn field_eq(a: &TermContent, b: &TermContent, field: ContentField) -> bool {
        match field {
            ContentField::Name => a.name == b.name,
            ContentField::Category => a.category == b.category,
            ContentField::Definition => a.definition == b.definition,
            ContentField::WhyExists => a.why_exists == b.why_exists,
            ContentField::UsedWhen => a.used_when == b.used_when,
            ContentField::NotUsedWhen => a.not_used_when == b.not_used_when,
            ContentField::ExamplesGood => a.examples_good == b.examples_good,
            ContentField::ExamplesBad => a.examples_bad == b.examples_bad,
            ContentField::Synonyms => a.synonyms == b.synonyms,
        }
    }
}
