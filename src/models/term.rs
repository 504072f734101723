//! Term-related request DTOs

use crate::governance::{NewTerm, TermEdit};
use crate::term::{ContentPatch, TermContent, TermStatus, Visibility};
use serde::Deserialize;
use validator::Validate;

/// Definitional fields as submitted by a client.
///
/// Required strings default to empty so a missing field is reported as a
/// validation error instead of a body rejection.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TermContentInput {
    #[serde(default, alias = "name")]
    #[validate(length(min = 1, max = 200, message = "termName is required (max 200 characters)"))]
    pub term_name: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "category is required (max 100 characters)"))]
    pub category: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "definition is required"))]
    pub definition: String,
    #[serde(default)]
    pub why_exists: Option<String>,
    #[serde(default)]
    pub used_when: Option<String>,
    #[serde(default)]
    pub not_used_when: Option<String>,
    #[serde(default)]
    pub examples_good: Vec<String>,
    #[serde(default)]
    pub examples_bad: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl From<TermContentInput> for TermContent {
    fn from(input: TermContentInput) -> Self {
        TermContent {
            name: input.term_name,
            category: input.category,
            definition: input.definition,
            why_exists: input.why_exists,
            used_when: input.used_when,
            not_used_when: input.not_used_when,
            examples_good: input.examples_good,
            examples_bad: input.examples_bad,
            synonyms: input.synonyms,
        }
    }
}

/// Request to create a term directly (admin)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTermRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub content: TermContentInput,
    pub status: Option<TermStatus>,
    pub visibility: Option<Visibility>,
    pub owner: Option<String>,
    #[validate(length(max = 1000, message = "changeNote is limited to 1000 characters"))]
    pub change_note: Option<String>,
}

impl From<CreateTermRequest> for NewTerm {
    fn from(req: CreateTermRequest) -> Self {
        NewTerm {
            content: req.content.into(),
            status: req.status,
            visibility: req.visibility,
            owner: req.owner,
            change_note: req.change_note,
        }
    }
}

/// Request to edit a term's content directly (admin)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditTermRequest {
    #[serde(flatten)]
    pub patch: ContentPatch,
    #[validate(length(max = 1000, message = "changeNote is limited to 1000 characters"))]
    pub change_note: Option<String>,
    #[validate(range(min = 1, message = "expectedVersion must be positive"))]
    pub expected_version: Option<i32>,
}

impl From<EditTermRequest> for TermEdit {
    fn from(req: EditTermRequest) -> Self {
        TermEdit {
            patch: req.patch,
            change_note: req.change_note,
            expected_version: req.expected_version,
        }
    }
}

/// Query for comparing two versions of a term
#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub from: i32,
    pub to: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_required_fields_fail_validation() {
        let req: CreateTermRequest = serde_json::from_value(json!({ "category": "Delivery" })).unwrap();
        let errors = req.validate().unwrap_err().to_string();
        assert!(errors.contains("termName"));
        assert!(errors.contains("definition"));
    }

    #[test]
    fn test_edit_request_flattens_patch() {
        let req: EditTermRequest = serde_json::from_value(json!({
            "definition": "A formal go/no-go review",
            "changeNote": "Tighten",
            "expectedVersion": 2
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let edit = TermEdit::from(req);
        assert_eq!(edit.patch.definition.as_deref(), Some("A formal go/no-go review"));
        assert_eq!(edit.expected_version, Some(2));
        assert!(edit.patch.name.is_none());
    }
}
