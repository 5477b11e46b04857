//! Phased persistence into the destination store.
//!
//! The project shell is written first on the calling thread (with users and
//! role members on their own pools), then each staging segment is streamed
//! through a [`BoundedExecutor`] in dependency order: issues, first-degree
//! entities, second-degree entities, attachments, custom field values.

pub mod context;
pub mod entity;
pub mod executor;
pub mod handler;
pub mod project;

pub use context::PersistContext;
pub use entity::{PersistError, PersistOutcome};
pub use executor::BoundedExecutor;
pub use handler::{PersistPhase, PersisterHandler, persist};
pub use project::{create_missing_users, import_project_shell};

use crate::backup::read_export;
use crate::config::ImportSettings;
use crate::error::Result;
use crate::progress::{EntityCountProgress, ProgressSink};
use std::path::Path;
use std::sync::Arc;

/// Stream one staging segment through a fresh executor.
///
/// Returns `true` when the attempt was aborted during the phase. The
/// executor is always shut down, even when reading the segment fails.
///
/// # Errors
///
/// Returns an error if the executor cannot start or the segment cannot be
/// read.
pub fn run_phase(
    ctx: &Arc<PersistContext>,
    settings: &ImportSettings,
    phase: PersistPhase,
    segment: &Path,
    total: usize,
    sink: Arc<dyn ProgressSink>,
) -> Result<bool> {
    let span = tracing::info_span!("persist_phase", phase = %phase, total);
    let _enter = span.enter();

    let progress = Arc::new(EntityCountProgress::new(
        sink,
        phase.interval(),
        total,
        settings.progress_step,
        phase.label(),
    ));
    if total == 0 {
        progress.finish();
        return Ok(ctx.results.abort_import());
    }

    let executor = BoundedExecutor::new(
        phase.executor_name(),
        settings.worker_threads,
        settings.queue_capacity,
        Arc::clone(&ctx.results),
    )?;
    let mut handler =
        PersisterHandler::new(Arc::clone(ctx), &executor, phase, Arc::clone(&progress));
    let read = read_export(segment, &mut handler);
    let submitted = handler.submitted();
    drop(handler);
    let aborted = executor.shutdown();
    read?;

    progress.finish();
    tracing::info!(submitted, processed = progress.processed(), aborted, "Phase finished");
    Ok(aborted)
}
