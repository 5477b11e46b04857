//! Auto-mapper and validator.
//!
//! [`auto_map`] fills identity maps by exact name match against the
//! destination; [`validate`] turns what is still unresolved into a
//! [`MappingResult`]. Both run entirely before the first destination write.

pub mod matcher;
pub mod validate;

pub use matcher::auto_map;
pub use validate::{read_attachments, validate};

use crate::config::ProjectImportOptions;
use crate::error::{ImportError, Result};
use crate::model::BackupProject;
use crate::storage::{DestinationProject, DestinationStore};

/// What auto-mapping and validation read besides the identity maps.
pub struct MappingContext<'a> {
    pub store: &'a dyn DestinationStore,
    pub project: &'a BackupProject,
    pub options: &'a ProjectImportOptions,
    /// The destination project with the same key, if it already exists.
    pub destination: Option<DestinationProject>,
}

impl<'a> MappingContext<'a> {
    /// # Errors
    ///
    /// Returns an error if the destination project lookup fails.
    pub fn new(
        store: &'a dyn DestinationStore,
        project: &'a BackupProject,
        options: &'a ProjectImportOptions,
    ) -> Result<Self> {
        let destination = store
            .find_project_by_key(project.key())
            .map_err(|e| ImportError::store("auto-mapping", e))?;
        Ok(Self {
            store,
            project,
            options,
            destination,
        })
    }

    #[must_use]
    pub fn destination_project_id(&self) -> Option<&str> {
        self.destination.as_ref().map(|project| project.id.as_str())
    }
}

impl std::fmt::Debug for MappingContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingContext")
            .field("project", &self.project.key())
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}
