//! Data model shared by every pipeline component.

pub mod backup;
pub mod external;
pub mod mapping;
pub mod record;
pub mod results;
pub mod state;

pub use backup::{BackupOverview, BackupProject, BackupSystemInformation};
pub use external::{
    ExternalAttachment, ExternalComponent, ExternalCustomField, ExternalCustomFieldConfiguration,
    ExternalIssue, ExternalProject, ExternalProjectRoleActor, ExternalUser, ExternalVersion,
    RoleActorType, issue_key_number,
};
pub use mapping::{MappingCategory, MappingResult, MessageSet};
pub use record::{ExportRecord, RecordError, kind};
pub use results::{
    EntityCategory, EntityCounts, ImportResults, ImportSummary, ImportedProject, RoleMemberCounts,
};
pub use state::ImportState;
