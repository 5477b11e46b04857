mod common;

use common::fixtures::many_issues;
use common::{destination, options, settings};
use project_import::model::{EntityCategory, MappingCategory, kind};
use project_import::storage::DestinationStore;
use project_import::ProjectImportManager;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn present_files_copied_and_missing_ones_skipped() {
    let dir = TempDir::new().unwrap();
    let mut export = many_issues(1);
    export.push(
        kind::FILE_ATTACHMENT,
        &[("id", "800"), ("issue", "1001"), ("filename", "trace.log"), ("author", "fred")],
    );
    export.push(
        kind::FILE_ATTACHMENT,
        &[("id", "801"), ("issue", "1001"), ("filename", "lost.png")],
    );
    let export = export.write(&dir);

    let files = TempDir::new().unwrap();
    let issue_dir = files.path().join("TST").join("TST-1");
    std::fs::create_dir_all(&issue_dir).unwrap();
    std::fs::write(issue_dir.join("800"), b"stack trace").unwrap();

    let store = destination();
    let dyn_store: Arc<dyn DestinationStore> = store.clone();
    let manager = ProjectImportManager::new(dyn_store, settings(&dir));
    let overview = manager.read_overview(&export).unwrap();
    let mut data = manager
        .prepare(options(export).with_attachment_path(files.path()), &overview)
        .unwrap();
    assert_eq!(data.counts().attachments, 2);

    let mapping = manager.map_and_validate(&mut data).unwrap();
    assert!(mapping.can_import());
    let messages = mapping.message_set(MappingCategory::FileAttachment).unwrap();
    assert_eq!(messages.warnings.len(), 1);
    assert!(messages.warnings[0].contains("lost.png"));

    let results = manager.import(&mut data).unwrap();
    let counts = results.counts(EntityCategory::Attachments);
    assert_eq!((counts.created, counts.skipped), (1, 1));
    assert_eq!(store.attachment_count().unwrap(), 1);
}

#[test]
fn missing_attachment_directory_blocks_import() {
    let dir = TempDir::new().unwrap();
    let export = many_issues(1).write(&dir);
    let store: Arc<dyn DestinationStore> = destination();
    let manager = ProjectImportManager::new(store, settings(&dir));

    let overview = manager.read_overview(&export).unwrap();
    let mut data = manager
        .prepare(
            options(export).with_attachment_path(dir.path().join("nowhere")),
            &overview,
        )
        .unwrap();
    let mapping = manager.map_and_validate(&mut data).unwrap();
    assert_eq!(mapping.blocking_categories(), vec![MappingCategory::FileAttachment]);
}
