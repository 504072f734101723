//! Term data models
//!
//! A term is split into its definitional content (what reviewers govern and
//! what the version ledger snapshots) and its bookkeeping metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a canonical term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermStatus {
    Draft,
    Canonical,
    InReview,
    Deprecated,
}

impl TermStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermStatus::Draft => "draft",
            TermStatus::Canonical => "canonical",
            TermStatus::InReview => "in_review",
            TermStatus::Deprecated => "deprecated",
        }
    }
}

impl Default for TermStatus {
    fn default() -> Self {
        TermStatus::Canonical
    }
}

impl fmt::Display for TermStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TermStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TermStatus::Draft),
            "canonical" => Ok(TermStatus::Canonical),
            "in_review" => Ok(TermStatus::InReview),
            "deprecated" => Ok(TermStatus::Deprecated),
            other => Err(format!("Unknown term status '{}'", other)),
        }
    }
}

/// Who may see a term outside the organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Internal,
    ClientSafe,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Internal => "internal",
            Visibility::ClientSafe => "client_safe",
            Visibility::Public => "public",
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Internal
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Visibility::Internal),
            "client_safe" => Ok(Visibility::ClientSafe),
            "public" => Ok(Visibility::Public),
            other => Err(format!("Unknown visibility '{}'", other)),
        }
    }
}

/// Names of the content fields, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentField {
    Name,
    Category,
    Definition,
    WhyExists,
    UsedWhen,
    NotUsedWhen,
    ExamplesGood,
    ExamplesBad,
    Synonyms,
}

impl ContentField {
    pub const ALL: [ContentField; 9] = [
        ContentField::Name,
        ContentField::Category,
        ContentField::Definition,
        ContentField::WhyExists,
        ContentField::UsedWhen,
        ContentField::NotUsedWhen,
        ContentField::ExamplesGood,
        ContentField::ExamplesBad,
        ContentField::Synonyms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentField::Name => "name",
            ContentField::Category => "category",
            ContentField::Definition => "definition",
            ContentField::WhyExists => "whyExists",
            ContentField::UsedWhen => "usedWhen",
            ContentField::NotUsedWhen => "notUsedWhen",
            ContentField::ExamplesGood => "examplesGood",
            ContentField::ExamplesBad => "examplesBad",
            ContentField::Synonyms => "synonyms",
        }
    }
}

impl fmt::Display for ContentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The definitional fields of a term.
///
/// Proposals carry a full copy of these, and every version ledger entry
/// snapshots exactly this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermContent {
    #[serde(alias = "termName")]
    pub name: String,
    pub category: String,
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

impl TermContent {
    /// JSON value of a single field, used for before/after rendering
    pub fn field_value(&self, field: ContentField) -> serde_json::Value {
        use serde_json::json;
        match field {
            ContentField::Name => json!(self.name),
            ContentField::Category => json!(self.category),
            ContentField::Definition => json!(self.definition),
            ContentField::WhyExists => json!(self.why_exists),
            ContentField::UsedWhen => json!(self.used_when),
            ContentField::NotUsedWhen => json!(self.not_used_when),
            ContentField::ExamplesGood => json!(self.examples_good),
            ContentField::ExamplesBad => json!(self.examples_bad),
            ContentField::Synonyms => json!(self.synonyms),
        }
    }

    /// Returns a copy with every field present in `patch` replaced
    pub fn overlay(&self, patch: &ContentPatch) -> TermContent {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(category) = &patch.category {
            next.category = category.clone();
        }
        if let Some(definition) = &patch.definition {
            next.definition = definition.clone();
        }
        // An empty string in a patch clears an optional text field
        if let Some(why) = &patch.why_exists {
            next.why_exists = non_empty(why);
        }
        if let Some(used) = &patch.used_when {
            next.used_when = non_empty(used);
        }
        if let Some(not_used) = &patch.not_used_when {
            next.not_used_when = non_empty(not_used);
        }
        if let Some(good) = &patch.examples_good {
            next.examples_good = good.clone();
        }
        if let Some(bad) = &patch.examples_bad {
            next.examples_bad = bad.clone();
        }
        if let Some(synonyms) = &patch.synonyms {
            next.synonyms = synonyms.clone();
        }
        next
    }

    /// Trim surrounding whitespace from every text value
    pub fn normalized(mut self) -> TermContent {
        self.name = self.name.trim().to_string();
        self.category = self.category.trim().to_string();
        self.definition = self.definition.trim().to_string();
        self.why_exists = self.why_exists.as_deref().and_then(non_empty);
        self.used_when = self.used_when.as_deref().and_then(non_empty);
        self.not_used_when = self.not_used_when.as_deref().and_then(non_empty);
        for list in [&mut self.examples_good, &mut self.examples_bad, &mut self.synonyms] {
            for item in list.iter_mut() {
                *item = item.trim().to_string();
            }
        }
        self
    }

    /// Check required fields. Expects normalized content.
    pub fn validate(&self) -> Result<(), String> {
        let mut missing = Vec::new();
        if self.name.is_empty() {
            missing.push("termName");
        }
        if self.category.is_empty() {
            missing.push("category");
        }
        if self.definition.is_empty() {
            missing.push("definition");
        }
        if !missing.is_empty() {
            return Err(format!("Missing required fields: {}", missing.join(", ")));
        }

        for (field, list) in [
            (ContentField::ExamplesGood, &self.examples_good),
            (ContentField::ExamplesBad, &self.examples_bad),
            (ContentField::Synonyms, &self.synonyms),
        ] {
            if list.iter().any(|item| item.is_empty()) {
                return Err(format!("{} must not contain blank entries", field));
            }
        }
        Ok(())
    }

    /// Case-insensitive match over name, definition and synonyms
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.definition.to_lowercase().contains(&needle)
            || self.synonyms.iter().any(|s| s.to_lowercase().contains(&needle))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Partial content update. Absent fields are left untouched.
///
/// Used for submitter resubmissions, reviewer edits at approval time and
/// administrative term edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPatch {
    #[serde(default, alias = "termName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_exists: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_used_when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples_good: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples_bad: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonyms: Option<Vec<String>>,
}

impl ContentPatch {
    pub fn is_empty(&self) -> bool {
        self == &ContentPatch::default()
    }
}

/// A canonical glossary entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: Uuid,
    #[serde(flatten)]
    pub content: TermContent,
    pub status: TermStatus,
    pub visibility: Visibility,
    pub owner: Option<String>,
    /// Current version; always equals the newest ledger entry's number
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Term {
    /// A brand new term at version 1
    pub fn new(content: TermContent, status: TermStatus, visibility: Visibility, owner: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content,
            status,
            visibility,
            owner,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The next version of this term carrying `content`
    pub fn next_version(&self, content: TermContent) -> Term {
        Term {
            content,
            version: self.version + 1,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Administrative, non-content attributes of a term
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermMetadataUpdate {
    pub status: Option<TermStatus>,
    pub visibility: Option<Visibility>,
    pub owner: Option<String>,
}

impl TermMetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.visibility.is_none() && self.owner.is_none()
    }
}

/// Filter for term listings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermFilter {
    pub category: Option<String>,
    pub status: Option<TermStatus>,
    pub visibility: Option<Visibility>,
    #[serde(alias = "search")]
    pub q: Option<String>,
}

impl TermFilter {
    pub fn matches(&self, term: &Term) -> bool {
        if let Some(category) = &self.category {
            if !term.content.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if term.status != status {
                return false;
            }
        }
        if let Some(visibility) = self.visibility {
            if term.visibility != visibility {
                return false;
            }
        }
        match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => term.content.matches_query(q),
            _ => true,
        }
    }
}

/// Number of terms filed under one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: String,
    pub term_count: usize,
}

#[cfg(test)]
pub(crate) fn sample_content(name: &str) -> TermContent {
    TermContent {
        name: name.to_string(),
        category: "Delivery".to_string(),
        definition: format!("{} is a checkpoint between project phases", name),
        why_exists: Some("Keeps scope decisions explicit".to_string()),
        used_when: None,
        not_used_when: None,
        examples_good: vec!["We passed the design phase gate".to_string()],
        examples_bad: vec![],
        synonyms: vec!["Stage gate".to_string()],
    }
}
