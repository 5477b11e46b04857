//! Per-attempt staging segments.

use crate::error::{ImportError, Result};
use crate::model::ExportRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One staging file per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingSegment {
    Issues,
    CustomFieldValues,
    IssueRelated,
    SecondDegree,
    Attachments,
}

impl StagingSegment {
    pub const ALL: [Self; 5] = [
        Self::Issues,
        Self::CustomFieldValues,
        Self::IssueRelated,
        Self::SecondDegree,
        Self::Attachments,
    ];

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Issues => "issues.jsonl",
            Self::CustomFieldValues => "custom-field-values.jsonl",
            Self::IssueRelated => "issue-related.jsonl",
            Self::SecondDegree => "second-degree.jsonl",
            Self::Attachments => "attachments.jsonl",
        }
    }
}

/// Temporary directory holding the staging segments of one attempt.
///
/// Dropping it removes the directory; removal failures are ignored.
#[derive(Debug)]
pub struct StagingFiles {
    dir: TempDir,
}

impl StagingFiles {
    /// Create the directory under `parent`, or the system temp dir.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Staging`] if the directory cannot be created.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("project-import-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|source| ImportError::Staging {
            path: parent.map_or_else(std::env::temp_dir, Path::to_path_buf),
            source,
        })?;
        tracing::debug!(dir = %dir.path().display(), "Created staging directory");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn path(&self, segment: StagingSegment) -> PathBuf {
        self.dir.path().join(segment.file_name())
    }

    /// Open a fresh writer for `segment`, truncating anything there.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Staging`] if the file cannot be created.
    pub fn writer(&self, segment: StagingSegment) -> Result<SegmentWriter> {
        SegmentWriter::create(self.path(segment))
    }
}

/// Append-only writer for one staging segment.
#[derive(Debug)]
pub struct SegmentWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    count: usize,
}

impl SegmentWriter {
    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path).map_err(|source| ImportError::Staging {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            count: 0,
        })
    }

    /// Append `record` unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write(&mut self, record: &ExportRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer
            .write_all(b"\n")
            .map_err(|source| self.staging_error(source))?;
        self.count += 1;
        Ok(())
    }

    /// Flush buffered records to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn finish(&mut self) -> Result<usize> {
        self.writer
            .flush()
            .map_err(|source| self.staging_error(source))?;
        Ok(self.count)
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_error(&self, source: std::io::Error) -> ImportError {
        ImportError::Staging {
            path: self.path.clone(),
            source,
        }
    }
}
