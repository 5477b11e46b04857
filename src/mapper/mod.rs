//! Identity Map Store.
//!
//! One independently locked [`IdentityMap`] per entity category, grouped
//! behind the [`ImportMapper`] facade. Categories written by different
//! phases never share a lock.

pub mod custom_field;
pub mod identity;
pub mod users;

pub use custom_field::{CustomFieldMapper, CustomFieldOptionMapper, OptionInfo};
pub use identity::IdentityMap;
pub use users::UserMapper;

use crate::model::{BackupProject, ExternalProjectRoleActor, MappingCategory};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

/// Role memberships recorded in the export for the imported project.
#[derive(Debug, Default)]
pub struct ProjectRoleActorMapper {
    actors: RwLock<Vec<ExternalProjectRoleActor>>,
}

impl ProjectRoleActorMapper {
    pub fn add(&self, actor: ExternalProjectRoleActor) {
        self.actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(actor);
    }

    #[must_use]
    pub fn actors(&self) -> Vec<ExternalProjectRoleActor> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every identity map used by one import attempt.
#[derive(Debug)]
pub struct ImportMapper {
    pub users: UserMapper,
    pub groups: IdentityMap,
    pub projects: IdentityMap,
    pub versions: IdentityMap,
    pub components: IdentityMap,
    pub priorities: IdentityMap,
    pub resolutions: IdentityMap,
    pub statuses: IdentityMap,
    pub issue_types: IdentityMap,
    pub custom_fields: CustomFieldMapper,
    pub custom_field_options: CustomFieldOptionMapper,
    pub project_roles: IdentityMap,
    pub project_role_actors: ProjectRoleActorMapper,
    pub issue_link_types: IdentityMap,
    pub issue_security_levels: IdentityMap,
    pub issues: IdentityMap,
    pub comments: IdentityMap,
    pub change_groups: IdentityMap,
    issue_type_statuses: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl Default for ImportMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportMapper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: UserMapper::new(),
            groups: IdentityMap::new("group"),
            projects: IdentityMap::new("project"),
            versions: IdentityMap::new("version"),
            components: IdentityMap::new("component"),
            priorities: IdentityMap::new("priority"),
            resolutions: IdentityMap::new("resolution"),
            statuses: IdentityMap::new("status"),
            issue_types: IdentityMap::new("issue type"),
            custom_fields: CustomFieldMapper::new(),
            custom_field_options: CustomFieldOptionMapper::new(),
            project_roles: IdentityMap::new("project role"),
            project_role_actors: ProjectRoleActorMapper::default(),
            issue_link_types: IdentityMap::new("issue link type"),
            issue_security_levels: IdentityMap::new("issue security level"),
            issues: IdentityMap::new("issue"),
            comments: IdentityMap::new("comment"),
            change_groups: IdentityMap::new("change group"),
            issue_type_statuses: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mapper seeded with what the overview knows about the project.
    #[must_use]
    pub fn for_backup_project(project: &BackupProject) -> Self {
        let mapper = Self::new();
        mapper
            .projects
            .register_old_value(project.id(), Some(project.key()));
        mapper.projects.flag_required(project.id());
        if let Some(lead) = &project.project.lead {
            mapper.users.flag_mandatory(lead);
        }
        for version in &project.versions {
            mapper
                .versions
                .register_old_value(&version.id, Some(&version.name));
        }
        for component in &project.components {
            mapper
                .components
                .register_old_value(&component.id, Some(&component.name));
            if let Some(lead) = &component.lead {
                mapper.users.flag_mandatory(lead);
            }
        }
        for configuration in &project.custom_fields {
            mapper
                .custom_fields
                .register_field(configuration.custom_field.clone());
        }
        for actor in &project.role_actors {
            mapper.project_roles.register_old_value(&actor.role_id, None);
            mapper.project_role_actors.add(actor.clone());
        }
        mapper
    }

    /// An issue of `issue_type_id` uses `status_id`.
    pub fn flag_status_for_issue_type(&self, issue_type_id: &str, status_id: &str) {
        self.issue_type_statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(issue_type_id.to_string())
            .or_default()
            .insert(status_id.to_string());
    }

    /// Old status ids in use, per old issue type id.
    #[must_use]
    pub fn statuses_by_issue_type(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.issue_type_statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The plain identity map behind a validation category.
    #[must_use]
    pub const fn map_for(&self, category: MappingCategory) -> Option<&IdentityMap> {
        match category {
            MappingCategory::Project => Some(&self.projects),
            MappingCategory::IssueType => Some(&self.issue_types),
            MappingCategory::CustomField => Some(self.custom_fields.identity()),
            MappingCategory::CustomFieldOption => Some(self.custom_field_options.identity()),
            MappingCategory::Priority => Some(&self.priorities),
            MappingCategory::Resolution => Some(&self.resolutions),
            MappingCategory::Status => Some(&self.statuses),
            MappingCategory::ProjectRole => Some(&self.project_roles),
            MappingCategory::User => Some(self.users.identity()),
            MappingCategory::Group => Some(&self.groups),
            MappingCategory::IssueLinkType => Some(&self.issue_link_types),
            MappingCategory::IssueSecurityLevel => Some(&self.issue_security_levels),
            MappingCategory::ProjectRoleActor | MappingCategory::FileAttachment => None,
        }
    }
}
