//! Typed views of export records ("external" entities, keyed by old ids).

use super::record::{ExportRecord, RecordError, kind};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExternalProject {
    pub id: String,
    pub key: String,
    pub name: String,
    pub lead: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub assignee_type: Option<String>,
    pub counter: Option<String>,
    pub email_sender: Option<String>,
    pub category: Option<String>,
}

impl ExternalProject {
    /// # Errors
    ///
    /// Returns an error if `id` or `key` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        let key = record.require("key")?.to_string();
        Ok(Self {
            id: record.require("id")?.to_string(),
            name: record.owned("name").unwrap_or_else(|| key.clone()),
            key,
            lead: record.owned("lead"),
            description: record.owned("description"),
            url: record.owned("url"),
            assignee_type: record.owned("assigneetype"),
            counter: record.owned("counter"),
            email_sender: record.owned("emailsender"),
            category: record.owned("category"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalVersion {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub sequence: i64,
    pub released: bool,
    pub archived: bool,
    pub release_date: Option<String>,
}

impl ExternalVersion {
    /// # Errors
    ///
    /// Returns an error if `id`, `project` or `name` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        Ok(Self {
            id: record.require("id")?.to_string(),
            project_id: record.require("project")?.to_string(),
            name: record.require("name")?.to_string(),
            description: record.owned("description"),
            sequence: record.number("sequence").unwrap_or(0),
            released: record.flag("released"),
            archived: record.flag("archived"),
            release_date: record.owned("releasedate"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalComponent {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub lead: Option<String>,
    pub assignee_type: Option<String>,
}

impl ExternalComponent {
    /// # Errors
    ///
    /// Returns an error if `id`, `project` or `name` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        Ok(Self {
            id: record.require("id")?.to_string(),
            project_id: record.require("project")?.to_string(),
            name: record.require("name")?.to_string(),
            description: record.owned("description"),
            lead: record.owned("lead"),
            assignee_type: record.owned("assigneetype"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalCustomField {
    pub id: String,
    pub name: String,
    pub type_key: String,
}

impl ExternalCustomField {
    /// # Errors
    ///
    /// Returns an error if `id` or `name` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        Ok(Self {
            id: record.require("id")?.to_string(),
            name: record.require("name")?.to_string(),
            type_key: record.owned("type").unwrap_or_default(),
        })
    }

    /// Values of this field reference custom field options by id.
    #[must_use]
    pub fn is_option_backed(&self) -> bool {
        const OPTION_TYPES: &[&str] = &[
            "select",
            "multiselect",
            "radiobuttons",
            "multicheckboxes",
            "cascadingselect",
        ];
        let suffix = self.type_key.rsplit(':').next().unwrap_or_default();
        OPTION_TYPES.contains(&suffix)
    }
}

/// A custom field together with where it applies in the backup project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalCustomFieldConfiguration {
    pub custom_field: ExternalCustomField,
    /// Issue type ids the field is restricted to; `None` means all types.
    pub issue_type_ids: Option<Vec<String>>,
}

impl ExternalCustomFieldConfiguration {
    #[must_use]
    pub fn applies_to_issue_type(&self, issue_type_id: &str) -> bool {
        self.issue_type_ids
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|id| id == issue_type_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalUser {
    pub key: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl ExternalUser {
    /// # Errors
    ///
    /// Returns an error if `name` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        Ok(Self {
            key: record.require("name")?.to_string(),
            full_name: record.owned("fullname"),
            email: record.owned("email"),
        })
    }
}

/// Kind of actor a project role membership points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleActorType {
    User,
    Group,
    Unknown,
}

impl RoleActorType {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "user" | "atlassian-user-role-actor" => Self::User,
            "group" | "atlassian-group-role-actor" => Self::Group,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalProjectRoleActor {
    pub id: Option<String>,
    pub project_id: String,
    pub role_id: String,
    pub actor_type: RoleActorType,
    pub actor: String,
}

impl ExternalProjectRoleActor {
    /// # Errors
    ///
    /// Returns an error if `project`, `role`, `type` or `actor` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        Ok(Self {
            id: record.owned("id"),
            project_id: record.require("project")?.to_string(),
            role_id: record.require("role")?.to_string(),
            actor_type: RoleActorType::parse(record.require("type")?),
            actor: record.require("actor")?.to_string(),
        })
    }
}

/// Issue as read from the issues staging segment, old ids throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExternalIssue {
    pub id: String,
    pub key: String,
    pub project_id: String,
    pub issue_type: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub security_level: Option<String>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub creator: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub environment: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub due_date: Option<String>,
    pub resolution_date: Option<String>,
    pub votes: Option<i64>,
    pub watches: Option<i64>,
    pub original_estimate: Option<i64>,
    pub remaining_estimate: Option<i64>,
    pub time_spent: Option<i64>,
}

impl ExternalIssue {
    /// # Errors
    ///
    /// Returns an error if `id`, `key`, `project` or `type` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        debug_assert!(record.is(kind::ISSUE));
        Ok(Self {
            id: record.require("id")?.to_string(),
            key: record.require("key")?.to_string(),
            project_id: record.require("project")?.to_string(),
            issue_type: record.require("type")?.to_string(),
            status: record.owned("status"),
            priority: record.owned("priority"),
            resolution: record.owned("resolution"),
            security_level: record.owned("security"),
            reporter: record.owned("reporter"),
            assignee: record.owned("assignee"),
            creator: record.owned("creator"),
            summary: record.owned("summary").unwrap_or_default(),
            description: record.owned("description"),
            environment: record.owned("environment"),
            created: record.owned("created"),
            updated: record.owned("updated"),
            due_date: record.owned("duedate"),
            resolution_date: record.owned("resolutiondate"),
            votes: record.number("votes"),
            watches: record.number("watches"),
            original_estimate: record.number("timeoriginalestimate"),
            remaining_estimate: record.number("timeestimate"),
            time_spent: record.number("timespent"),
        })
    }

    /// Numeric suffix of the issue key (`TST-102` -> 102).
    #[must_use]
    pub fn key_number(&self) -> Option<i64> {
        issue_key_number(&self.key)
    }
}

/// Numeric suffix of an issue key.
#[must_use]
pub fn issue_key_number(key: &str) -> Option<i64> {
    key.rsplit_once('-')
        .and_then(|(_, number)| number.parse::<i64>().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalAttachment {
    pub id: String,
    pub issue_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub author: Option<String>,
    pub created: Option<String>,
}

impl ExternalAttachment {
    /// # Errors
    ///
    /// Returns an error if `id`, `issue` or `filename` is missing.
    pub fn from_record(record: &ExportRecord) -> Result<Self, RecordError> {
        Ok(Self {
            id: record.require("id")?.to_string(),
            issue_id: record.require("issue")?.to_string(),
            file_name: record.require("filename")?.to_string(),
            mime_type: record.owned("mimetype"),
            file_size: record.number("filesize"),
            author: record.owned("author"),
            created: record.owned("created"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_number_takes_suffix() {
        assert_eq!(issue_key_number("TST-102"), Some(102));
        assert_eq!(issue_key_number("MY-PROJ-7"), Some(7));
        assert_eq!(issue_key_number("TST"), None);
    }

    #[test]
    fn option_backed_types() {
        let mut field = ExternalCustomField {
            id: "1".to_string(),
            name: "Colour".to_string(),
            type_key: "com.example:select".to_string(),
        };
        assert!(field.is_option_backed());
        field.type_key = "com.example:textfield".to_string();
        assert!(!field.is_option_backed());
    }

    #[test]
    fn role_actor_types() {
        assert_eq!(RoleActorType::parse("atlassian-group-role-actor"), RoleActorType::Group);
        assert_eq!(RoleActorType::parse("user"), RoleActorType::User);
        assert_eq!(RoleActorType::parse("robot"), RoleActorType::Unknown);
    }

    #[test]
    fn configuration_without_restriction_applies_everywhere() {
        let config = ExternalCustomFieldConfiguration {
            custom_field: ExternalCustomField {
                id: "1".to_string(),
                name: "Colour".to_string(),
                type_key: String::new(),
            },
            issue_type_ids: None,
        };
        assert!(config.applies_to_issue_type("42"));
    }
}
