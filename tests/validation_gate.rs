mod common;

use common::fixtures::{issue, many_issues};
use common::{options, reference_data, settings};
use project_import::model::{MappingCategory, kind};
use project_import::storage::{
    DestinationCustomField, DestinationStore, ReferenceKind, SqliteDestination,
};
use project_import::{ImportError, ImportState, ProjectImportManager};
use std::sync::Arc;
use tempfile::TempDir;

fn destination_without_statuses() -> Arc<SqliteDestination> {
    common::init_test_logging();
    let store = SqliteDestination::open_memory().unwrap();
    store
        .add_reference_value(ReferenceKind::IssueType, "7", "Bug", None)
        .unwrap();
    store
        .add_reference_value(ReferenceKind::Priority, "2", "Major", None)
        .unwrap();
    store.add_user("fred", None).unwrap();
    Arc::new(store)
}

#[test]
fn unmapped_status_blocks_until_fixed() {
    let dir = TempDir::new().unwrap();
    let export = many_issues(2).write(&dir);
    let store = destination_without_statuses();
    let dyn_store: Arc<dyn DestinationStore> = store.clone();
    let manager = ProjectImportManager::new(dyn_store, settings(&dir));

    let overview = manager.read_overview(&export).unwrap();
    let mut data = manager.prepare(options(export), &overview).unwrap();
    let mapping = manager.map_and_validate(&mut data).unwrap();
    assert!(!mapping.can_import());
    assert_eq!(mapping.blocking_categories(), vec![MappingCategory::Status]);

    store
        .add_reference_value(ReferenceKind::Status, "3", "Open", None)
        .unwrap();
    let mapping = manager.map_and_validate(&mut data).unwrap();
    assert!(mapping.can_import(), "{mapping:?}");

    let results = manager.import(&mut data).unwrap();
    assert_eq!(data.state(), ImportState::Completed);
    assert!(results.errors().is_empty());
}

#[test]
fn failed_validation_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let export = many_issues(2).write(&dir);
    let store = destination_without_statuses();
    let dyn_store: Arc<dyn DestinationStore> = store.clone();
    let manager = ProjectImportManager::new(dyn_store, settings(&dir));

    let overview = manager.read_overview(&export).unwrap();
    let mut data = manager.prepare(options(export), &overview).unwrap();
    manager.map_and_validate(&mut data).unwrap();
    let err = manager.import(&mut data).unwrap_err();

    assert!(matches!(err, ImportError::ValidationFailed(_)));
    assert!(err.persisted_nothing());
    assert_eq!(data.state(), ImportState::Aborted);
    assert!(store.find_project_by_key("TST").unwrap().is_none());
}

#[test]
fn import_requires_validation() {
    let dir = TempDir::new().unwrap();
    let export = many_issues(1).write(&dir);
    let store: Arc<dyn DestinationStore> = common::destination();
    let manager = ProjectImportManager::new(store, settings(&dir));

    let overview = manager.read_overview(&export).unwrap();
    let mut data = manager.prepare(options(export), &overview).unwrap();
    assert!(matches!(manager.import(&mut data), Err(ImportError::NotValidated)));
    assert_eq!(data.state(), ImportState::Mapping);
}

#[test]
fn unknown_project_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let export = many_issues(1).write(&dir);
    let store: Arc<dyn DestinationStore> = common::destination();
    let manager = ProjectImportManager::new(store, settings(&dir));

    let overview = manager.read_overview(&export).unwrap();
    let err = manager
        .prepare(project_import::ProjectImportOptions::new(export, "NOPE"), &overview)
        .unwrap_err();
    assert!(matches!(err, ImportError::ProjectNotInBackup { key } if key == "NOPE"));
}

#[test]
fn malformed_export_fails_before_partitioning() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.jsonl");
    std::fs::write(&path, "{\"kind\":\"Project\",\"fields\":{}}\nnot json\n").unwrap();
    let store: Arc<dyn DestinationStore> = common::destination();
    let manager = ProjectImportManager::new(store, settings(&dir));

    let err = manager.read_overview(&path).unwrap_err();
    assert!(matches!(err, ImportError::MalformedExport { line: 2, .. }));
    assert!(err.persisted_nothing());
}

#[test]
fn field_for_other_issue_types_blocks_even_when_value_comes_first() {
    let dir = TempDir::new().unwrap();
    let export = reference_data()
        .record(kind::PROJECT, &[("id", "10"), ("key", "TST"), ("name", "Test")])
        .record(
            kind::CUSTOM_FIELD,
            &[("id", "20"), ("name", "Colour"), ("type", "plugin:textfield")],
        )
        .record(
            kind::CUSTOM_FIELD_VALUE,
            &[("id", "900"), ("issue", "1001"), ("customfield", "20"), ("stringvalue", "Red")],
        )
        .record(kind::ISSUE, &issue("1001", "TST-1"))
        .write(&dir);

    let store = destination_without_statuses();
    store
        .add_reference_value(ReferenceKind::Status, "3", "Open", None)
        .unwrap();
    store
        .add_custom_field(&DestinationCustomField {
            id: "40".to_string(),
            name: "Colour".to_string(),
            type_key: "plugin:textfield".to_string(),
            project_ids: None,
            issue_type_ids: Some(vec!["99".to_string()]),
        })
        .unwrap();
    let dyn_store: Arc<dyn DestinationStore> = store.clone();
    let manager = ProjectImportManager::new(dyn_store, settings(&dir));

    let overview = manager.read_overview(&export).unwrap();
    let mut data = manager.prepare(options(export), &overview).unwrap();
    let mapping = manager.map_and_validate(&mut data).unwrap();

    assert!(!mapping.can_import());
    assert_eq!(mapping.blocking_categories(), vec![MappingCategory::CustomField]);
}
