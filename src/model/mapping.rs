//! Validation messages and the per-attempt mapping verdict.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Severity-split collection of validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageSet {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl MessageSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Fold another set into this one.
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Identity categories that get validated independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingCategory {
    Project,
    IssueType,
    CustomField,
    CustomFieldOption,
    Priority,
    Resolution,
    Status,
    ProjectRole,
    ProjectRoleActor,
    User,
    Group,
    IssueLinkType,
    IssueSecurityLevel,
    FileAttachment,
}

impl MappingCategory {
    pub const ALL: [Self; 14] = [
        Self::Project,
        Self::IssueType,
        Self::CustomField,
        Self::CustomFieldOption,
        Self::Priority,
        Self::Resolution,
        Self::Status,
        Self::ProjectRole,
        Self::ProjectRoleActor,
        Self::User,
        Self::Group,
        Self::IssueLinkType,
        Self::IssueSecurityLevel,
        Self::FileAttachment,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::IssueType => "issue-type",
            Self::CustomField => "custom-field",
            Self::CustomFieldOption => "custom-field-option",
            Self::Priority => "priority",
            Self::Resolution => "resolution",
            Self::Status => "status",
            Self::ProjectRole => "project-role",
            Self::ProjectRoleActor => "project-role-actor",
            Self::User => "user",
            Self::Group => "group",
            Self::IssueLinkType => "issue-link-type",
            Self::IssueSecurityLevel => "issue-security-level",
            Self::FileAttachment => "file-attachment",
        }
    }
}

impl fmt::Display for MappingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of one auto-map + validate round.
///
/// Built by the validator, read by the orchestrator. A new round produces a
/// new result; an existing one is never edited after validation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingResult {
    message_sets: BTreeMap<MappingCategory, MessageSet>,
}

impl MappingResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&mut self, category: MappingCategory, messages: MessageSet) {
        self.message_sets.insert(category, messages);
    }

    #[must_use]
    pub fn message_set(&self, category: MappingCategory) -> Option<&MessageSet> {
        self.message_sets.get(&category)
    }

    /// True when no category carries an error-level message.
    #[must_use]
    pub fn can_import(&self) -> bool {
        self.message_sets.values().all(|set| !set.has_errors())
    }

    /// Categories that block the import.
    #[must_use]
    pub fn blocking_categories(&self) -> Vec<MappingCategory> {
        self.message_sets
            .iter()
            .filter(|(_, set)| set.has_errors())
            .map(|(category, _)| *category)
            .collect()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.message_sets.values().map(|set| set.errors.len()).sum()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.message_sets.values().map(|set| set.warnings.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MappingCategory, &MessageSet)> {
        self.message_sets.iter().map(|(category, set)| (*category, set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_block() {
        let mut result = MappingResult::new();
        let mut users = MessageSet::new();
        users.add_warning("user 'fred' will be created");
        result.set(MappingCategory::User, users);
        assert!(result.can_import());
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn errors_block_and_are_listed() {
        let mut result = MappingResult::new();
        let mut status = MessageSet::new();
        status.add_error("status 'Triage' is not mapped");
        result.set(MappingCategory::Status, status);
        result.set(MappingCategory::Priority, MessageSet::new());
        assert!(!result.can_import());
        assert_eq!(result.blocking_categories(), vec![MappingCategory::Status]);
    }
}
