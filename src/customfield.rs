//! Pluggable custom field value parsers.
//!
//! Each parser binds one export entity kind to a parse/represent pair. The
//! registry is built once per pipeline and consulted by kind name.

use crate::model::{ExportRecord, RecordError, kind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A custom field value as stored in the export, old ids throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCustomFieldValue {
    pub id: String,
    pub issue_id: String,
    pub custom_field_id: String,
    pub parent_key: Option<String>,
    pub string_value: Option<String>,
    pub number_value: Option<String>,
    pub text_value: Option<String>,
    pub date_value: Option<String>,
}

pub trait CustomFieldValueParser: Send + Sync {
    /// Export entity kind this parser reads.
    fn entity_kind(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns [`RecordError`] when a required attribute is missing.
    fn parse(&self, record: &ExportRecord) -> Result<ExternalCustomFieldValue, RecordError>;

    /// Destination fields for a value whose issue and field are already
    /// translated.
    fn entity_representation(
        &self,
        value: &ExternalCustomFieldValue,
        issue_id: &str,
        custom_field_id: &str,
    ) -> BTreeMap<String, String>;
}

/// Parser for the standard `CustomFieldValue` entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCustomFieldValueParser;

impl CustomFieldValueParser for DefaultCustomFieldValueParser {
    fn entity_kind(&self) -> &'static str {
        kind::CUSTOM_FIELD_VALUE
    }

    fn parse(&self, record: &ExportRecord) -> Result<ExternalCustomFieldValue, RecordError> {
        Ok(ExternalCustomFieldValue {
            id: record.require("id")?.to_string(),
            issue_id: record.require("issue")?.to_string(),
            custom_field_id: record.require("customfield")?.to_string(),
            parent_key: record.owned("parentkey"),
            string_value: record.owned("stringvalue"),
            number_value: record.owned("numbervalue"),
            text_value: record.owned("textvalue"),
            date_value: record.owned("datevalue"),
        })
    }

    fn entity_representation(
        &self,
        value: &ExternalCustomFieldValue,
        issue_id: &str,
        custom_field_id: &str,
    ) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("issue".to_string(), issue_id.to_string());
        fields.insert("customfield".to_string(), custom_field_id.to_string());
        let optional = [
            ("parentkey", &value.parent_key),
            ("stringvalue", &value.string_value),
            ("numbervalue", &value.number_value),
            ("textvalue", &value.text_value),
            ("datevalue", &value.date_value),
        ];
        for (name, field) in optional {
            if let Some(field) = field {
                fields.insert(name.to_string(), field.clone());
            }
        }
        fields
    }
}

/// Parsers keyed by the entity kind they read.
#[derive(Clone)]
pub struct CustomFieldParserRegistry {
    parsers: HashMap<&'static str, Arc<dyn CustomFieldValueParser>>,
}

impl CustomFieldParserRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registry with the built-in parsers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DefaultCustomFieldValueParser));
        registry
    }

    /// Add a parser; a later registration for the same kind replaces the
    /// earlier one.
    pub fn register(&mut self, parser: Arc<dyn CustomFieldValueParser>) {
        let kind = parser.entity_kind();
        if self.parsers.insert(kind, parser).is_some() {
            tracing::debug!(kind, "Replaced custom field value parser");
        }
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn CustomFieldValueParser>> {
        self.parsers.get(kind)
    }

    #[must_use]
    pub fn handles(&self, kind: &str) -> bool {
        self.parsers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.parsers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for CustomFieldParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CustomFieldParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomFieldParserRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
