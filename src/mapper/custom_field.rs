//! Custom fields and their options.

use super::identity::IdentityMap;
use crate::model::ExternalCustomField;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

/// Identity map for custom fields, tracking type and issue-type usage.
#[derive(Debug)]
pub struct CustomFieldMapper {
    map: IdentityMap,
    fields: RwLock<HashMap<String, ExternalCustomField>>,
    issue_types_in_use: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl Default for CustomFieldMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomFieldMapper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: IdentityMap::new("custom field"),
            fields: RwLock::new(HashMap::new()),
            issue_types_in_use: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &IdentityMap {
        &self.map
    }

    pub fn register_field(&self, field: ExternalCustomField) {
        self.map.register_old_value(&field.id, Some(&field.name));
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(field.id.clone(), field);
    }

    /// A value for `field_id` exists on an issue of `issue_type_id`.
    pub fn flag_value_in_use(&self, field_id: &str, issue_type_id: Option<&str>) {
        self.map.flag_required(field_id);
        let mut in_use = self
            .issue_types_in_use
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let types = in_use.entry(field_id.to_string()).or_default();
        if let Some(issue_type_id) = issue_type_id {
            types.insert(issue_type_id.to_string());
        }
    }

    #[must_use]
    pub fn field(&self, field_id: &str) -> Option<ExternalCustomField> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(field_id)
            .cloned()
    }

    #[must_use]
    pub fn is_option_backed(&self, field_id: &str) -> bool {
        self.field(field_id)
            .is_some_and(|field| field.is_option_backed())
    }

    /// Old issue type ids whose issues carry a value for the field.
    #[must_use]
    pub fn issue_types_in_use(&self, field_id: &str) -> BTreeSet<String> {
        self.issue_types_in_use
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(field_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Fields that carry at least one value in the imported project.
    #[must_use]
    pub fn fields_in_use(&self) -> Vec<String> {
        self.map.required_old_ids()
    }

    #[must_use]
    pub fn get_mapped_id(&self, field_id: &str) -> Option<String> {
        self.map.get_mapped_id(field_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionInfo {
    pub field_id: String,
    pub parent_id: Option<String>,
    pub value: String,
}

/// Identity map for custom field options, tracking the owning field and
/// parent option.
#[derive(Debug)]
pub struct CustomFieldOptionMapper {
    map: IdentityMap,
    options: RwLock<HashMap<String, OptionInfo>>,
}

impl Default for CustomFieldOptionMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomFieldOptionMapper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: IdentityMap::new("custom field option"),
            options: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &IdentityMap {
        &self.map
    }

    pub fn register_option(&self, option_id: &str, info: OptionInfo) {
        self.map.register_old_value(option_id, Some(&info.value));
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(option_id.to_string(), info);
    }

    #[must_use]
    pub fn option(&self, option_id: &str) -> Option<OptionInfo> {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(option_id)
            .cloned()
    }

    /// Required options belonging to `field_id`.
    #[must_use]
    pub fn required_options_for_field(&self, field_id: &str) -> Vec<String> {
        self.map
            .required_old_ids()
            .into_iter()
            .filter(|id| {
                self.option(id)
                    .is_some_and(|info| info.field_id == field_id)
            })
            .collect()
    }

    #[must_use]
    pub fn get_mapped_id(&self, option_id: &str) -> Option<String> {
        self.map.get_mapped_id(option_id)
    }
}
