mod common;

use common::{destination, options, reference_data, settings};
use project_import::model::{EntityCategory, MappingCategory, kind};
use project_import::storage::DestinationStore;
use project_import::ProjectImportManager;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn missing_group_is_skipped_with_one_warning() {
    let dir = TempDir::new().unwrap();
    let export = reference_data()
        .record(kind::PROJECT, &[("id", "10"), ("key", "TST"), ("name", "Test")])
        .record(
            kind::PROJECT_ROLE_ACTOR,
            &[("project", "10"), ("role", "1"), ("type", "atlassian-user-role-actor"), ("actor", "fred")],
        )
        .record(
            kind::PROJECT_ROLE_ACTOR,
            &[("project", "10"), ("role", "1"), ("type", "atlassian-group-role-actor"), ("actor", "devs")],
        )
        .record(
            kind::PROJECT_ROLE_ACTOR,
            &[("project", "10"), ("role", "1"), ("type", "atlassian-group-role-actor"), ("actor", "ghosts")],
        )
        .write(&dir);
    let store = destination();
    store.add_group("devs").unwrap();
    let dyn_store: Arc<dyn DestinationStore> = store.clone();
    let manager = ProjectImportManager::new(dyn_store, settings(&dir));

    let overview = manager.read_overview(&export).unwrap();
    let mut data = manager.prepare(options(export), &overview).unwrap();
    let mapping = manager.map_and_validate(&mut data).unwrap();
    assert!(mapping.can_import());
    let actor_messages = mapping.message_set(MappingCategory::ProjectRoleActor).unwrap();
    assert_eq!(actor_messages.warnings.len(), 1);

    let results = manager.import(&mut data).unwrap();
    let warnings = results.warnings();
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("ghosts"));

    let developers = results.role_members("Developers");
    assert_eq!(developers.users, 1);
    assert_eq!(developers.groups, 1);
    assert_eq!(results.counts(EntityCategory::RoleMembers).created, 2);

    let project = results.imported_project().unwrap();
    let members = store.role_members(&project.id).unwrap();
    assert!(members.iter().all(|(role, _, actor)| role == "11" && actor != "ghosts"));
    assert_eq!(members.len(), 2);
}
