#![allow(dead_code)]

use super::{ExportBuilder, reference_data};
use project_import::model::kind;

/// Project "TST" (old id 10) with three issues, their related data and a
/// custom field value, plus a second project "OTH" that must not leak in.
pub fn tst_export() -> ExportBuilder {
    reference_data()
        .record(
            kind::PROJECT,
            &[("id", "10"), ("key", "TST"), ("name", "Test"), ("lead", "fred"), ("counter", "12")],
        )
        .record(
            kind::PROJECT,
            &[("id", "20"), ("key", "OTH"), ("name", "Other"), ("counter", "1")],
        )
        .record(
            kind::VERSION,
            &[("id", "50"), ("project", "10"), ("name", "1.0"), ("sequence", "1")],
        )
        .record(
            kind::COMPONENT,
            &[("id", "60"), ("project", "10"), ("name", "Core"), ("lead", "fred")],
        )
        .record(
            kind::CUSTOM_FIELD,
            &[("id", "20"), ("name", "Colour"), ("type", "plugin:select")],
        )
        .record(kind::CUSTOM_FIELD_CONTEXT, &[("customfield", "20")])
        .record(
            kind::CUSTOM_FIELD_OPTION,
            &[("id", "5"), ("customfield", "20"), ("value", "Red")],
        )
        .record(kind::ISSUE, &issue("100", "TST-4"))
        .record(kind::ISSUE, &issue("101", "TST-7"))
        .record(kind::ISSUE, &issue("102", "TST-12"))
        .record(
            kind::ISSUE,
            &[
                ("id", "200"),
                ("key", "OTH-1"),
                ("project", "20"),
                ("type", "1"),
                ("status", "1"),
                ("summary", "Elsewhere"),
            ],
        )
        .record(
            kind::CUSTOM_FIELD_VALUE,
            &[("id", "900"), ("issue", "102"), ("customfield", "20"), ("stringvalue", "5")],
        )
        .record(
            kind::COMMENT,
            &[("id", "300"), ("issue", "100"), ("author", "fred"), ("body", "First")],
        )
        .record(
            kind::COMMENT,
            &[("id", "301"), ("issue", "200"), ("author", "fred"), ("body", "Not ours")],
        )
        .record(
            kind::CHANGE_GROUP,
            &[("id", "400"), ("issue", "101"), ("author", "fred")],
        )
        .record(
            kind::CHANGE_ITEM,
            &[("id", "401"), ("group", "400"), ("field", "status")],
        )
        .record(kind::LABEL, &[("id", "500"), ("issue", "100"), ("label", "urgent")])
        .record(
            kind::ISSUE_LINK,
            &[("id", "600"), ("source", "100"), ("destination", "101"), ("linktype", "1")],
        )
        .record(
            kind::ENTITY_PROPERTY,
            &[
                ("id", "700"),
                ("entityname", kind::COMMENT_PROPERTY),
                ("entityid", "300"),
                ("key", "reactions"),
            ],
        )
}

pub fn issue<'a>(id: &'a str, key: &'a str) -> [(&'static str, &'a str); 7] {
    [
        ("id", id),
        ("key", key),
        ("project", "10"),
        ("type", "1"),
        ("status", "1"),
        ("priority", "1"),
        ("reporter", "fred"),
    ]
}

/// Project "TST" with `count` bare issues numbered from 1.
pub fn many_issues(count: usize) -> ExportBuilder {
    let mut export = reference_data().record(
        kind::PROJECT,
        &[("id", "10"), ("key", "TST"), ("name", "Test")],
    );
    for number in 1..=count {
        let id = (1000 + number).to_string();
        let key = format!("TST-{number}");
        export.push(kind::ISSUE, &issue(&id, &key));
    }
    export
}
