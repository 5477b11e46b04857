//! Import attempt state machine.

use crate::error::{ImportError, Result};
use serde::Serialize;
use std::fmt;

/// Where an import attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportState {
    Created,
    Partitioning,
    Mapping,
    Validating,
    PersistingProject,
    PersistingIssues,
    PersistingRelated,
    PersistingSecondDegree,
    PersistingAttachments,
    PersistingCustomFields,
    Finalizing,
    Completed,
    Aborted,
}

impl ImportState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Partitioning => "partitioning",
            Self::Mapping => "mapping",
            Self::Validating => "validating",
            Self::PersistingProject => "persisting-project",
            Self::PersistingIssues => "persisting-issues",
            Self::PersistingRelated => "persisting-related",
            Self::PersistingSecondDegree => "persisting-second-degree",
            Self::PersistingAttachments => "persisting-attachments",
            Self::PersistingCustomFields => "persisting-custom-fields",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    #[must_use]
    pub const fn is_persisting(self) -> bool {
        matches!(
            self,
            Self::PersistingProject
                | Self::PersistingIssues
                | Self::PersistingRelated
                | Self::PersistingSecondDegree
                | Self::PersistingAttachments
                | Self::PersistingCustomFields
        )
    }

    /// Whether `self -> next` is a legal step.
    ///
    /// Persistence phases run in a fixed order but any of them may jump
    /// straight to `Finalizing` once the attempt aborts. A failed mapping
    /// round may be retried (`Validating -> Mapping`).
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ImportState::{
            Aborted, Completed, Created, Finalizing, Mapping, Partitioning,
            PersistingAttachments, PersistingCustomFields, PersistingIssues, PersistingProject,
            PersistingRelated, PersistingSecondDegree, Validating,
        };
        matches!(
            (self, next),
            (Created, Partitioning | Aborted)
                | (Partitioning, Mapping | Aborted)
                | (Mapping, Validating | Aborted)
                | (Validating, Mapping | PersistingProject | Aborted)
                | (PersistingProject, PersistingIssues | Finalizing)
                | (PersistingIssues, PersistingRelated | Finalizing)
                | (PersistingRelated, PersistingSecondDegree | Finalizing)
                | (PersistingSecondDegree, PersistingAttachments | Finalizing)
                | (PersistingAttachments, PersistingCustomFields | Finalizing)
                | (PersistingCustomFields, Finalizing)
                | (Finalizing, Completed | Aborted)
        )
    }

    /// Checked transition.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::InvalidState`] when the step is not allowed.
    pub fn transition(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(ImportError::InvalidState {
                from: self.as_str(),
                to: next.as_str(),
            });
        }
        tracing::debug!(from = self.as_str(), to = next.as_str(), "Import state change");
        *self = next;
        Ok(())
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        let mut state = ImportState::Created;
        for next in [
            ImportState::Partitioning,
            ImportState::Mapping,
            ImportState::Validating,
            ImportState::PersistingProject,
            ImportState::PersistingIssues,
            ImportState::PersistingRelated,
            ImportState::PersistingSecondDegree,
            ImportState::PersistingAttachments,
            ImportState::PersistingCustomFields,
            ImportState::Finalizing,
            ImportState::Completed,
        ] {
            state.transition(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn persistence_phase_skips_to_finalizing_on_abort() {
        let mut state = ImportState::PersistingIssues;
        state.transition(ImportState::Finalizing).unwrap();
        state.transition(ImportState::Aborted).unwrap();
    }

    #[test]
    fn cannot_persist_without_validating() {
        let mut state = ImportState::Mapping;
        let err = state.transition(ImportState::PersistingIssues).unwrap_err();
        assert!(matches!(err, ImportError::InvalidState { .. }));
        assert_eq!(state, ImportState::Mapping);
    }

    #[test]
    fn persistence_cannot_abort_without_finalizing() {
        assert!(!ImportState::PersistingRelated.can_transition_to(ImportState::Aborted));
    }
}
