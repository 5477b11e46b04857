//! Export records: the unit of data flowing through every pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Entity-kind names used in the export stream.
pub mod kind {
    pub const PROJECT: &str = "Project";
    pub const ISSUE: &str = "Issue";
    pub const COMMENT: &str = "Comment";
    pub const WORKLOG: &str = "Worklog";
    pub const CHANGE_GROUP: &str = "ChangeGroup";
    pub const CHANGE_ITEM: &str = "ChangeItem";
    pub const ISSUE_LINK: &str = "IssueLink";
    pub const NODE_ASSOCIATION: &str = "NodeAssociation";
    pub const USER_ASSOCIATION: &str = "UserAssociation";
    pub const LABEL: &str = "Label";
    pub const CUSTOM_FIELD_VALUE: &str = "CustomFieldValue";
    pub const ENTITY_PROPERTY: &str = "EntityProperty";
    pub const COMPONENT: &str = "Component";
    pub const VERSION: &str = "Version";
    pub const USER: &str = "User";
    pub const GROUP: &str = "Group";
    pub const PROJECT_ROLE_ACTOR: &str = "ProjectRoleActor";
    pub const FILE_ATTACHMENT: &str = "FileAttachment";
    pub const PRIORITY: &str = "Priority";
    pub const RESOLUTION: &str = "Resolution";
    pub const STATUS: &str = "Status";
    pub const ISSUE_TYPE: &str = "IssueType";
    pub const CUSTOM_FIELD: &str = "CustomField";
    pub const CUSTOM_FIELD_OPTION: &str = "CustomFieldOption";
    pub const CUSTOM_FIELD_CONTEXT: &str = "CustomFieldContext";
    pub const PROJECT_ROLE: &str = "ProjectRole";
    pub const ISSUE_LINK_TYPE: &str = "IssueLinkType";
    pub const ISSUE_SECURITY_LEVEL: &str = "IssueSecurityLevel";
    pub const BACKUP_INFO: &str = "BackupInfo";

    /// `EntityProperty.entityname` values.
    pub const ISSUE_PROPERTY: &str = "IssueProperty";
    pub const COMMENT_PROPERTY: &str = "CommentProperty";
    pub const CHANGE_HISTORY_PROPERTY: &str = "ChangeHistoryProperty";
}

/// One entity from the export: a kind tag plus its string-valued attributes.
///
/// Records are produced one at a time by the export reader and written to
/// staging segments unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub kind: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl ExportRecord {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Attribute value; empty strings count as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Attribute value that must be present for the record to be usable.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] naming the kind and the missing field.
    pub fn require(&self, name: &'static str) -> Result<&str, RecordError> {
        self.get(name).ok_or_else(|| RecordError {
            kind: self.kind.clone(),
            field: name,
            id: self.get("id").map(str::to_string),
        })
    }

    /// Owned copy of an optional attribute.
    #[must_use]
    pub fn owned(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }

    /// Parse an optional numeric attribute, ignoring garbage.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|value| value.trim().parse().ok())
    }

    /// Parse an optional boolean attribute (`true`/`1`).
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some("true" | "1" | "yes"))
    }
}

/// A record lacks a field it cannot be processed without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub kind: String,
    pub field: &'static str,
    pub id: Option<String>,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} '{}' is missing '{}'", self.kind, id, self.field),
            None => write!(f, "{} record is missing '{}'", self.kind, self.field),
        }
    }
}

impl std::error::Error for RecordError {}
