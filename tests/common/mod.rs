#![allow(dead_code)]

use project_import::model::{ExportRecord, kind};
use project_import::storage::{
    DestinationCustomField, DestinationOption, ReferenceKind, SqliteDestination,
};
use project_import::{ImportSettings, ProjectImportOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tempfile::TempDir;

pub mod fixtures;
pub mod store;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        project_import::logging::init_test_logging();
    });
}

/// Export file assembled record by record.
#[derive(Debug, Default)]
pub struct ExportBuilder {
    records: Vec<ExportRecord>,
}

impl ExportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, entity_kind: &str, fields: &[(&str, &str)]) -> Self {
        let mut record = ExportRecord::new(entity_kind);
        for (name, value) in fields {
            record = record.with(*name, *value);
        }
        self.records.push(record);
        self
    }

    pub fn push(&mut self, entity_kind: &str, fields: &[(&str, &str)]) {
        let mut record = ExportRecord::new(entity_kind);
        for (name, value) in fields {
            record = record.with(*name, *value);
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Write `export.jsonl` into `dir`.
    pub fn write(&self, dir: &TempDir) -> PathBuf {
        let path = dir.path().join("export.jsonl");
        let mut file = std::fs::File::create(&path).expect("create export");
        for record in &self.records {
            let line = serde_json::to_string(record).expect("serialize record");
            writeln!(file, "{line}").expect("write record");
        }
        path
    }
}

/// Reference data every fixture export shares.
pub fn reference_data() -> ExportBuilder {
    ExportBuilder::new()
        .record(kind::ISSUE_TYPE, &[("id", "1"), ("name", "Bug")])
        .record(kind::STATUS, &[("id", "1"), ("name", "Open")])
        .record(kind::PRIORITY, &[("id", "1"), ("name", "Major")])
        .record(kind::ISSUE_LINK_TYPE, &[("id", "1"), ("name", "Blocks")])
        .record(kind::PROJECT_ROLE, &[("id", "1"), ("name", "Developers")])
        .record(kind::USER, &[("name", "fred"), ("fullname", "Fred Flintstone")])
}

/// Destination with the reference data of [`reference_data`] under
/// different ids.
pub fn destination() -> Arc<SqliteDestination> {
    init_test_logging();
    let store = SqliteDestination::open_memory().expect("open destination");
    store
        .add_reference_value(ReferenceKind::IssueType, "7", "Bug", None)
        .unwrap();
    store
        .add_reference_value(ReferenceKind::Status, "3", "Open", None)
        .unwrap();
    store
        .add_reference_value(ReferenceKind::Priority, "2", "Major", None)
        .unwrap();
    store
        .add_reference_value(ReferenceKind::IssueLinkType, "4", "Blocks", None)
        .unwrap();
    store
        .add_reference_value(ReferenceKind::ProjectRole, "11", "Developers", None)
        .unwrap();
    store.add_user("fred", Some("Fred Flintstone")).unwrap();
    store
        .add_custom_field(&DestinationCustomField {
            id: "40".to_string(),
            name: "Colour".to_string(),
            type_key: "plugin:select".to_string(),
            project_ids: None,
            issue_type_ids: None,
        })
        .unwrap();
    store
        .add_custom_field_option(&DestinationOption {
            id: "9".to_string(),
            field_id: "40".to_string(),
            parent_id: None,
            value: "Red".to_string(),
        })
        .unwrap();
    Arc::new(store)
}

pub fn options(export: PathBuf) -> ProjectImportOptions {
    ProjectImportOptions::new(export, "TST")
}

pub fn settings(staging: &TempDir) -> ImportSettings {
    ImportSettings {
        worker_threads: 4,
        queue_capacity: 8,
        staging_dir: Some(staging.path().to_path_buf()),
        ..ImportSettings::default()
    }
}
