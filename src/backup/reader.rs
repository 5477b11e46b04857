//! Single-pass, event-driven reader for JSON Lines exports and staging segments.

use crate::error::{ImportError, Result};
use crate::model::ExportRecord;
use crate::progress::EntityCountProgress;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Consumer of export records.
///
/// Returning an error from any callback abandons the whole pass; that is
/// reserved for structural problems. Per-record problems are recorded by
/// the handler itself and the pass continues.
pub trait ImportEntityHandler {
    /// Whether this handler wants records of `kind`.
    fn handles(&self, kind: &str) -> bool;

    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()>;

    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }

    /// Return `false` to stop the pass early.
    fn wants_more(&self) -> bool {
        true
    }
}

/// Fans each record out to every registered handler interested in its kind.
///
/// The kind -> handler table is built lazily the first time a kind is seen,
/// so the per-record cost does not grow with the number of handlers.
pub struct ChainedHandler<'a> {
    handlers: Vec<&'a mut dyn ImportEntityHandler>,
    dispatch: HashMap<String, Vec<usize>>,
    progress: Option<&'a EntityCountProgress>,
}

impl<'a> ChainedHandler<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            dispatch: HashMap::new(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a EntityCountProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn register(&mut self, handler: &'a mut dyn ImportEntityHandler) {
        self.handlers.push(handler);
        self.dispatch.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn targets(&mut self, kind: &str) -> &[usize] {
        if !self.dispatch.contains_key(kind) {
            let interested = self
                .handlers
                .iter()
                .enumerate()
                .filter(|(_, handler)| handler.handles(kind))
                .map(|(index, _)| index)
                .collect();
            self.dispatch.insert(kind.to_string(), interested);
        }
        self.dispatch.get(kind).map(Vec::as_slice).unwrap_or_default()
    }
}

impl Default for ChainedHandler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportEntityHandler for ChainedHandler<'_> {
    /// With progress attached every record is taken, so the count matches
    /// the record total of the overview pass.
    fn handles(&self, kind: &str) -> bool {
        self.progress.is_some() || self.handlers.iter().any(|handler| handler.handles(kind))
    }

    fn start_document(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            handler.start_document()?;
        }
        Ok(())
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        let targets = self.targets(&record.kind).to_vec();
        for index in targets {
            self.handlers[index].handle_entity(record)?;
        }
        if let Some(progress) = self.progress {
            progress.processed_entity();
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        for handler in &mut self.handlers {
            handler.end_document()?;
        }
        Ok(())
    }

    fn wants_more(&self) -> bool {
        self.handlers.iter().any(|handler| handler.wants_more())
    }
}

/// Parse one line of the export.
///
/// # Errors
///
/// Returns [`ImportError::MalformedExport`] if the line is not a record object.
pub fn parse_record(line: &str, line_num: usize) -> Result<ExportRecord> {
    serde_json::from_str(line).map_err(|e| ImportError::MalformedExport {
        line: line_num,
        reason: e.to_string(),
    })
}

/// Stream records from `reader` through `handler`. Returns the number of
/// records delivered.
///
/// # Errors
///
/// Returns an error on I/O failure, malformed input, or a handler error.
pub fn read_records<R: BufRead>(reader: R, handler: &mut dyn ImportEntityHandler) -> Result<usize> {
    handler.start_document()?;
    let mut delivered = 0usize;

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_record(&line, line_num + 1)?;
        delivered += 1;
        if handler.handles(&record.kind) {
            handler.handle_entity(&record)?;
        }
        if !handler.wants_more() {
            tracing::debug!(records = delivered, "Handler stopped the pass early");
            break;
        }
    }

    handler.end_document()?;
    Ok(delivered)
}

/// Stream an export or staging file through `handler`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the pass fails.
pub fn read_export(path: &Path, handler: &mut dyn ImportEntityHandler) -> Result<usize> {
    let file = File::open(path)?;
    let reader = BufReader::with_capacity(2 * 1024 * 1024, file);
    let delivered = read_records(reader, handler)?;
    tracing::debug!(path = %path.display(), records = delivered, "Finished reading records");
    Ok(delivered)
}
