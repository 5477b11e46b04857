//! In-memory summary of the export, gathered before partitioning.

use super::external::{
    ExternalComponent, ExternalCustomFieldConfiguration, ExternalProject,
    ExternalProjectRoleActor, ExternalVersion,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Read-only reference data for one project in the export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupProject {
    pub project: ExternalProject,
    pub versions: Vec<ExternalVersion>,
    pub components: Vec<ExternalComponent>,
    pub custom_fields: Vec<ExternalCustomFieldConfiguration>,
    pub role_actors: Vec<ExternalProjectRoleActor>,
    #[serde(skip)]
    pub issue_ids: HashSet<String>,
}

impl BackupProject {
    #[must_use]
    pub fn new(project: ExternalProject) -> Self {
        Self {
            project,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.project.key
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.project.id
    }

    /// True when the issue with this old id belongs to the project.
    #[must_use]
    pub fn contains_issue(&self, issue_id: &str) -> bool {
        self.issue_ids.contains(issue_id)
    }

    #[must_use]
    pub fn custom_field(&self, custom_field_id: &str) -> Option<&ExternalCustomFieldConfiguration> {
        self.custom_fields
            .iter()
            .find(|config| config.custom_field.id == custom_field_id)
    }

    /// Versions sorted by their sequence, the order they are created in.
    #[must_use]
    pub fn ordered_versions(&self) -> Vec<&ExternalVersion> {
        let mut versions: Vec<_> = self.versions.iter().collect();
        versions.sort_by_key(|version| version.sequence);
        versions
    }

    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issue_ids.len()
    }
}

/// Whole-export facts that outlive the choice of project.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupSystemInformation {
    pub build_number: Option<String>,
    pub edition: Option<String>,
    /// Total number of records in the export, used for progress.
    pub entity_count: usize,
    /// Issue key by old issue id, across every project.
    #[serde(skip)]
    pub issue_keys: HashMap<String, String>,
}

impl BackupSystemInformation {
    #[must_use]
    pub fn issue_key(&self, issue_id: &str) -> Option<&str> {
        self.issue_keys.get(issue_id).map(String::as_str)
    }
}

/// Result of the overview pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupOverview {
    pub projects: Vec<BackupProject>,
    pub system: BackupSystemInformation,
}

impl BackupOverview {
    #[must_use]
    pub fn project(&self, key: &str) -> Option<&BackupProject> {
        self.projects.iter().find(|project| project.key() == key)
    }

    #[must_use]
    pub fn project_keys(&self) -> Vec<&str> {
        self.projects.iter().map(BackupProject::key).collect()
    }
}
