//! `project_import` - single-project import from a whole-system export
//!
//! Reads a JSON Lines export of an issue tracker, picks one project out of
//! it and re-creates that project in a destination store, translating every
//! old identifier to the destination's.
//!
//! # Architecture
//!
//! - [`backup`] - event-driven export reader and the overview pass
//! - [`partition`] - one streaming pass splitting the project into staging segments
//! - [`mapper`] - identity maps from old ids to destination ids
//! - [`automap`] - name-based auto-mapping and validation
//! - [`persist`] - bounded worker pools writing each phase
//! - [`manager`] - the orchestrator and its state machine
//! - [`storage`] - destination store trait and its `SQLite` implementation
//! - [`model`] - records, backup summaries, results
//! - [`config`] - engine settings and per-attempt options
//! - [`error`] - error types

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod automap;
pub mod backup;
pub mod config;
pub mod customfield;
pub mod error;
pub mod logging;
pub mod manager;
pub mod mapper;
pub mod model;
pub mod partition;
pub mod persist;
pub mod progress;
pub mod storage;

pub use config::{ImportSettings, ProjectImportOptions};
pub use error::{ImportError, Result, StoreError};
pub use manager::{CancelHandle, ProjectImportData, ProjectImportManager};
pub use model::{ImportResults, ImportState, MappingResult};
