//! The project shell: users, project, versions, components, role members.
//!
//! Everything here runs before the issue phases. Failing to create or find
//! the destination project is fatal; every other failure is a soft error.

use super::executor::BoundedExecutor;
use crate::config::{ImportSettings, ProjectImportOptions};
use crate::error::{ImportError, Result, StoreError};
use crate::mapper::ImportMapper;
use crate::model::{
    BackupProject, EntityCategory, ExternalProjectRoleActor, ImportResults, ImportedProject,
    RoleActorType,
};
use crate::storage::{
    DestinationProject, DestinationStore, NewComponent, NewRoleMember, NewUser, NewVersion,
    ProjectDetails,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Create every referenced user the destination lacks but the export
/// describes. Returns `true` if the attempt aborted meanwhile.
///
/// # Errors
///
/// Returns an error if the worker pool cannot be started.
pub fn create_missing_users(
    store: &Arc<dyn DestinationStore>,
    mapper: &Arc<ImportMapper>,
    results: &Arc<ImportResults>,
    settings: &ImportSettings,
) -> Result<bool> {
    let users = mapper.users.users_to_auto_create();
    if users.is_empty() {
        return Ok(results.abort_import());
    }
    tracing::info!(count = users.len(), "Creating missing users");

    let executor = BoundedExecutor::new(
        "CreateUsers",
        settings.worker_threads,
        settings.queue_capacity,
        Arc::clone(results),
    )?;
    for user in users {
        let store = Arc::clone(store);
        let mapper = Arc::clone(mapper);
        let results = Arc::clone(results);
        let submitted = executor.submit(move || {
            let new_user = NewUser {
                key: user.key.clone(),
                full_name: user.full_name.clone(),
                email: user.email.clone(),
            };
            let created = store
                .create_user(&new_user)
                .map_err(ImportError::from)
                .and_then(|()| mapper.users.map_value(&user.key, &user.key));
            match created {
                Ok(()) => results.increment_created(EntityCategory::Users),
                Err(err) => results.record_failure(
                    EntityCategory::Users,
                    format!("Could not create user '{}': {err}", user.key),
                ),
            }
        });
        if !submitted {
            break;
        }
    }
    Ok(executor.shutdown())
}

fn mapped_user(mapper: &ImportMapper, key: Option<&String>) -> Option<String> {
    key.map(|key| mapper.users.get_mapped_id(key).unwrap_or_else(|| key.clone()))
}

/// Create, update or look up the destination project, then bring its
/// versions, components and role members in line with the export.
///
/// Returns the destination project and whether it was created.
///
/// # Errors
///
/// Returns [`ImportError::ProjectNotFound`] when the project vanished before
/// an update, and [`ImportError::Store`] when the project itself cannot be
/// written or read.
pub fn import_project_shell(
    store: &Arc<dyn DestinationStore>,
    mapper: &Arc<ImportMapper>,
    results: &Arc<ImportResults>,
    backup: &BackupProject,
    options: &ProjectImportOptions,
    settings: &ImportSettings,
) -> Result<(DestinationProject, bool)> {
    let span = tracing::info_span!("project_shell", project = %backup.key());
    let _enter = span.enter();

    let lead = mapped_user(mapper, backup.project.lead.as_ref());
    let details = ProjectDetails::from_external(&backup.project, lead);
    let existing = store
        .find_project_by_key(backup.key())
        .map_err(|err| ImportError::store("project lookup", err))?;

    let (project, created) = match existing {
        None => {
            let project = store
                .create_project(&details)
                .map_err(|err| ImportError::store("project creation", err))?;
            tracing::info!(id = %project.id, "Created project");
            (project, true)
        }
        Some(project) if options.overwrite_project_details => {
            let updated = store
                .update_project_details(&project.id, &details)
                .map_err(|err| match err {
                    StoreError::NotFound { .. } => ImportError::ProjectNotFound {
                        key: backup.key().to_string(),
                    },
                    other => ImportError::store("project update", other),
                })?;
            tracing::info!(id = %updated.id, "Updated project details");
            (updated, false)
        }
        Some(project) => {
            tracing::info!(id = %project.id, "Importing into existing project");
            (project, false)
        }
    };

    mapper.projects.map_value(backup.id(), &project.id)?;
    results.set_imported_project(ImportedProject {
        id: project.id.clone(),
        key: project.key.clone(),
        created,
    });

    match backup.project.counter.as_deref().map(str::parse::<i64>) {
        Some(Ok(counter)) => store
            .set_project_issue_counter(&project.id, counter)
            .map_err(|err| ImportError::store("project counter", err))?,
        Some(Err(err)) => {
            tracing::warn!(counter = ?backup.project.counter, error = %err, "Ignoring unparsable issue counter");
        }
        None => {}
    }

    import_versions(store.as_ref(), mapper, results, backup, &project.id)?;
    import_components(store.as_ref(), mapper, results, backup, &project.id)?;

    if created || options.overwrite_project_details {
        store
            .remove_role_memberships(&project.id)
            .map_err(|err| ImportError::store("role membership reset", err))?;
        import_role_members(store, mapper, results, settings, &project.id)?;
    }

    Ok((project, created))
}

fn existing_by_name(
    entities: std::result::Result<Vec<crate::storage::NamedEntity>, StoreError>,
    what: &'static str,
) -> Result<HashMap<String, String>> {
    Ok(entities
        .map_err(|err| ImportError::store(what, err))?
        .into_iter()
        .map(|entity| (entity.name, entity.id))
        .collect())
}

fn import_versions(
    store: &dyn DestinationStore,
    mapper: &ImportMapper,
    results: &ImportResults,
    backup: &BackupProject,
    project_id: &str,
) -> Result<()> {
    let existing = existing_by_name(store.versions(project_id), "version lookup")?;
    for version in backup.ordered_versions() {
        if let Some(id) = existing.get(&version.name) {
            mapper.versions.map_value(&version.id, id)?;
            results.increment_skipped(EntityCategory::Versions);
            continue;
        }
        let new_version = NewVersion {
            project_id: project_id.to_string(),
            name: version.name.clone(),
            description: version.description.clone(),
            sequence: version.sequence,
            released: version.released,
            archived: version.archived,
            release_date: version.release_date.clone(),
        };
        match store.create_version(&new_version) {
            Ok(id) => {
                mapper.versions.map_value(&version.id, &id)?;
                results.increment_created(EntityCategory::Versions);
            }
            Err(err) => results.record_failure(
                EntityCategory::Versions,
                format!("Could not create version '{}': {err}", version.name),
            ),
        }
    }
    Ok(())
}

fn import_components(
    store: &dyn DestinationStore,
    mapper: &ImportMapper,
    results: &ImportResults,
    backup: &BackupProject,
    project_id: &str,
) -> Result<()> {
    let existing = existing_by_name(store.components(project_id), "component lookup")?;
    for component in &backup.components {
        if let Some(id) = existing.get(&component.name) {
            mapper.components.map_value(&component.id, id)?;
            results.increment_skipped(EntityCategory::Components);
            continue;
        }
        let new_component = NewComponent {
            project_id: project_id.to_string(),
            name: component.name.clone(),
            description: component.description.clone(),
            lead: mapped_user(mapper, component.lead.as_ref()),
            assignee_type: component.assignee_type.clone(),
        };
        match store.create_component(&new_component) {
            Ok(id) => {
                mapper.components.map_value(&component.id, &id)?;
                results.increment_created(EntityCategory::Components);
            }
            Err(err) => results.record_failure(
                EntityCategory::Components,
                format!("Could not create component '{}': {err}", component.name),
            ),
        }
    }
    Ok(())
}

fn add_role_member(
    store: &dyn DestinationStore,
    mapper: &ImportMapper,
    results: &ImportResults,
    project_id: &str,
    actor: &ExternalProjectRoleActor,
) -> std::result::Result<(), StoreError> {
    let role_name = mapper.project_roles.get_display_name(&actor.role_id);
    let Some(role_id) = mapper.project_roles.get_mapped_id(&actor.role_id) else {
        results.add_warning(format!(
            "Project role '{role_name}' does not exist, skipping role member '{}'.",
            actor.actor
        ));
        return Ok(());
    };

    let member_key = match actor.actor_type {
        RoleActorType::User => match mapper.users.get_mapped_id(&actor.actor) {
            Some(key) => Some(key),
            None if store.user_exists(&actor.actor)? => Some(actor.actor.clone()),
            None => None,
        },
        RoleActorType::Group => store
            .group_exists(&actor.actor)?
            .then(|| actor.actor.clone()),
        RoleActorType::Unknown => {
            tracing::debug!(actor = %actor.actor, role = %role_name, "Ignoring role actor of unknown type");
            return Ok(());
        }
    };
    let Some(member_key) = member_key else {
        results.add_warning(format!(
            "The {} '{}' does not exist and will not be added to project role '{role_name}'.",
            actor.actor_type.as_str(),
            actor.actor
        ));
        return Ok(());
    };

    store.create_role_membership(&NewRoleMember {
        project_id: project_id.to_string(),
        role_id,
        actor_type: actor.actor_type,
        actor: member_key,
    })?;
    if actor.actor_type == RoleActorType::User {
        results.increment_role_user(&role_name);
    } else {
        results.increment_role_group(&role_name);
    }
    Ok(())
}

fn import_role_members(
    store: &Arc<dyn DestinationStore>,
    mapper: &Arc<ImportMapper>,
    results: &Arc<ImportResults>,
    settings: &ImportSettings,
    project_id: &str,
) -> Result<()> {
    let actors = mapper.project_role_actors.actors();
    if actors.is_empty() {
        return Ok(());
    }
    let executor = BoundedExecutor::new(
        "CreateRoleMembers",
        settings.worker_threads,
        settings.queue_capacity,
        Arc::clone(results),
    )?;
    for actor in actors {
        let store = Arc::clone(store);
        let mapper = Arc::clone(mapper);
        let results = Arc::clone(results);
        let project_id = project_id.to_string();
        let submitted = executor.submit(move || {
            if let Err(err) = add_role_member(store.as_ref(), &mapper, &results, &project_id, &actor) {
                results.add_error(format!(
                    "Could not add '{}' to project role '{}': {err}",
                    actor.actor,
                    mapper.project_roles.get_display_name(&actor.role_id)
                ));
            }
        });
        if !submitted {
            break;
        }
    }
    executor.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExternalComponent, ExternalProject, ExternalVersion};
    use crate::storage::SqliteDestination;
    use std::path::PathBuf;

    fn backup() -> BackupProject {
        let mut backup = BackupProject::new(ExternalProject {
            id: "10".to_string(),
            key: "TST".to_string(),
            name: "Test".to_string(),
            counter: Some("57".to_string()),
            ..ExternalProject::default()
        });
        backup.versions = vec![ExternalVersion {
            id: "200".to_string(),
            project_id: "10".to_string(),
            name: "1.0".to_string(),
            description: None,
            sequence: 1,
            released: true,
            archived: false,
            release_date: None,
        }];
        backup.components = vec![ExternalComponent {
            id: "300".to_string(),
            project_id: "10".to_string(),
            name: "Core".to_string(),
            description: None,
            lead: None,
            assignee_type: None,
        }];
        backup
    }

    fn options() -> ProjectImportOptions {
        ProjectImportOptions::new(PathBuf::from("export.jsonl"), "TST")
    }

    #[test]
    fn creates_shell_then_reuses_it() {
        let sqlite = Arc::new(SqliteDestination::open_memory().unwrap());
        let store: Arc<dyn DestinationStore> = sqlite.clone();
        let backup = backup();
        let settings = ImportSettings::default();

        let mapper = Arc::new(ImportMapper::for_backup_project(&backup));
        let results = Arc::new(ImportResults::new(10));
        let (project, created) =
            import_project_shell(&store, &mapper, &results, &backup, &options(), &settings)
                .unwrap();
        assert!(created);
        assert_eq!(project.key, "TST");
        assert_eq!(store.find_project_by_key("TST").unwrap().unwrap().counter, 57);
        assert!(mapper.versions.get_mapped_id("200").is_some());
        assert_eq!(results.counts(EntityCategory::Components).created, 1);

        let mapper = Arc::new(ImportMapper::for_backup_project(&backup));
        let results = Arc::new(ImportResults::new(10));
        let (again, created) =
            import_project_shell(&store, &mapper, &results, &backup, &options(), &settings)
                .unwrap();
        assert!(!created);
        assert_eq!(again.id, project.id);
        assert_eq!(results.counts(EntityCategory::Versions).skipped, 1);
        assert_eq!(store.versions(&project.id).unwrap().len(), 1);
    }

    #[test]
    fn missing_group_role_actor_is_a_warning() {
        let sqlite = Arc::new(SqliteDestination::open_memory().unwrap());
        sqlite.add_user("fred", None).unwrap();
        let store: Arc<dyn DestinationStore> = sqlite.clone();
        let mut backup = backup();
        for (actor_type, actor) in [(RoleActorType::User, "fred"), (RoleActorType::Group, "ghosts")] {
            backup.role_actors.push(ExternalProjectRoleActor {
                id: None,
                project_id: "10".to_string(),
                role_id: "1".to_string(),
                actor_type,
                actor: actor.to_string(),
            });
        }
        let mapper = Arc::new(ImportMapper::for_backup_project(&backup));
        mapper.project_roles.register_old_value("1", Some("Developers"));
        mapper.project_roles.map_value("1", "1").unwrap();
        let results = Arc::new(ImportResults::new(10));

        let (project, _) = import_project_shell(
            &store,
            &mapper,
            &results,
            &backup,
            &options(),
            &ImportSettings::default(),
        )
        .unwrap();

        let warnings = results.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ghosts"));
        let developers = results.role_members("Developers");
        assert_eq!((developers.users, developers.groups), (1, 0));
        assert_eq!(sqlite.role_members(&project.id).unwrap().len(), 1);
    }
}
