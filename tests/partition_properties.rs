mod common;

use common::{ExportBuilder, options, reference_data, settings};
use project_import::ProjectImportManager;
use project_import::model::kind;
use project_import::storage::DestinationStore;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

/// (belongs to TST, comment count) per issue.
fn export_for(issues: &[(bool, usize)]) -> ExportBuilder {
    let mut export = reference_data()
        .record(kind::PROJECT, &[("id", "10"), ("key", "TST"), ("name", "Test")])
        .record(kind::PROJECT, &[("id", "20"), ("key", "OTH"), ("name", "Other")]);
    for (index, (ours, _)) in issues.iter().enumerate() {
        let id = (100 + index).to_string();
        let key = format!("{}-{}", if *ours { "TST" } else { "OTH" }, index + 1);
        let project = if *ours { "10" } else { "20" };
        export.push(
            kind::ISSUE,
            &[("id", id.as_str()), ("key", key.as_str()), ("project", project), ("type", "1"), ("status", "1")],
        );
    }
    let mut comment_id = 1000;
    for (index, (_, comments)) in issues.iter().enumerate() {
        let issue_id = (100 + index).to_string();
        for _ in 0..*comments {
            comment_id += 1;
            let id = comment_id.to_string();
            export.push(kind::COMMENT, &[("id", id.as_str()), ("issue", issue_id.as_str()), ("body", "x")]);
            export.push(
                kind::ENTITY_PROPERTY,
                &[("id", id.as_str()), ("entityname", kind::COMMENT_PROPERTY), ("entityid", id.as_str())],
            );
        }
    }
    export
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_project_record_routed_exactly_once(
        issues in proptest::collection::vec((any::<bool>(), 0usize..4), 0..12)
    ) {
        let dir = TempDir::new().unwrap();
        let export = export_for(&issues).write(&dir);
        let store: Arc<dyn DestinationStore> = common::destination();
        let manager = ProjectImportManager::new(store, settings(&dir));

        let overview = manager.read_overview(&export).unwrap();
        let data = manager.prepare(options(export), &overview).unwrap();
        let counts = data.counts();

        let ours: Vec<_> = issues.iter().filter(|(ours, _)| *ours).collect();
        let comments: usize = ours.iter().map(|(_, comments)| comments).sum();
        prop_assert_eq!(counts.issues, ours.len());
        prop_assert_eq!(counts.issue_related, comments);
        prop_assert_eq!(counts.second_degree, comments);
        prop_assert_eq!(counts.custom_field_values, 0);
        prop_assert!(data.results().warnings().is_empty());
    }
}
