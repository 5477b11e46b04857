//! State shared by the persistence tasks of one import attempt.

use super::entity::{PersistError, PersistOutcome};
use crate::customfield::CustomFieldParserRegistry;
use crate::mapper::ImportMapper;
use crate::model::{
    BackupProject, BackupSystemInformation, EntityCategory, ExportRecord, ImportResults,
};
use crate::storage::{DestinationProject, DestinationStore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub struct PersistContext {
    pub store: Arc<dyn DestinationStore>,
    pub mapper: Arc<ImportMapper>,
    pub results: Arc<ImportResults>,
    pub parsers: Arc<CustomFieldParserRegistry>,
    pub backup: Arc<BackupProject>,
    pub system: Arc<BackupSystemInformation>,
    /// Project being written into.
    pub destination: DestinationProject,
    pub attachment_root: Option<PathBuf>,
    largest_issue_number: AtomicI64,
    created_issue_ids: Mutex<Vec<String>>,
    /// (kind, old id) of records found already present in the destination.
    pre_existing: Mutex<HashSet<(&'static str, String)>>,
}

impl PersistContext {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        store: Arc<dyn DestinationStore>,
        mapper: Arc<ImportMapper>,
        results: Arc<ImportResults>,
        parsers: Arc<CustomFieldParserRegistry>,
        backup: Arc<BackupProject>,
        system: Arc<BackupSystemInformation>,
        destination: DestinationProject,
        attachment_root: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            mapper,
            results,
            parsers,
            backup,
            system,
            destination,
            attachment_root,
            largest_issue_number: AtomicI64::new(0),
            created_issue_ids: Mutex::new(Vec::new()),
            pre_existing: Mutex::new(HashSet::new()),
        }
    }

    /// Remember a newly created issue for the counter and the reindex.
    pub fn record_created_issue(&self, new_id: String, key_number: Option<i64>) {
        if let Some(number) = key_number {
            self.largest_issue_number.fetch_max(number, Ordering::SeqCst);
        }
        self.created_issue_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(new_id);
    }

    /// Largest key number among created issues; 0 when none were created.
    #[must_use]
    pub fn largest_issue_number(&self) -> i64 {
        self.largest_issue_number.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn created_issue_ids(&self) -> Vec<String> {
        self.created_issue_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remember that a record was not written because an earlier run already
    /// did. Records that belong to it are skipped in later phases.
    pub fn mark_pre_existing(&self, entity_kind: &'static str, old_id: &str) {
        self.pre_existing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((entity_kind, old_id.to_string()));
    }

    #[must_use]
    pub fn is_pre_existing(&self, entity_kind: &'static str, old_id: &str) -> bool {
        self.pre_existing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(entity_kind, old_id.to_string()))
    }

    /// Fold one task's outcome into the results.
    pub fn record_outcome(
        &self,
        record: &ExportRecord,
        outcome: std::result::Result<PersistOutcome, PersistError>,
    ) {
        let category = EntityCategory::for_kind(&record.kind);
        match outcome {
            Ok(PersistOutcome::Created(new_id)) => {
                tracing::trace!(kind = %record.kind, old_id = ?record.get("id"), new_id, "Created");
                self.results.increment_created(category);
            }
            Ok(PersistOutcome::Skipped(warning)) => {
                self.results.increment_skipped(category);
                if let Some(warning) = warning {
                    self.results.add_warning(warning);
                }
            }
            Err(err) => {
                let id = record.get("id").unwrap_or("?");
                self.results.record_failure(
                    category,
                    format!("Could not import {} '{id}': {err}", record.kind),
                );
            }
        }
    }
}

impl std::fmt::Debug for PersistContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistContext")
            .field("destination", &self.destination)
            .field("largest_issue_number", &self.largest_issue_number())
            .finish_non_exhaustive()
    }
}
