//! User references and the details needed to create missing users.

use super::identity::IdentityMap;
use crate::error::Result;
use crate::model::ExternalUser;
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

/// Identity map for users plus their export details.
///
/// Users are keyed by user name on both sides. A reference is mandatory when
/// the destination cannot hold the entity without it (reporter, assignee,
/// project or component lead) and optional otherwise (authors, voters,
/// watchers).
#[derive(Debug)]
pub struct UserMapper {
    map: IdentityMap,
    details: RwLock<HashMap<String, ExternalUser>>,
    mandatory: RwLock<BTreeSet<String>>,
}

impl Default for UserMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl UserMapper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: IdentityMap::new("user"),
            details: RwLock::new(HashMap::new()),
            mandatory: RwLock::new(BTreeSet::new()),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &IdentityMap {
        &self.map
    }

    /// Remember a user's export details.
    pub fn register_user(&self, user: ExternalUser) {
        self.map
            .register_old_value(&user.key, user.full_name.as_deref());
        self.details
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.key.clone(), user);
    }

    pub fn flag_mandatory(&self, key: &str) {
        self.map.flag_required(key);
        self.mandatory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    pub fn flag_optional(&self, key: &str) {
        self.map.flag_required(key);
    }

    #[must_use]
    pub fn is_mandatory(&self, key: &str) -> bool {
        self.mandatory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    #[must_use]
    pub fn user_details(&self, key: &str) -> Option<ExternalUser> {
        self.details
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// # Errors
    ///
    /// Returns an error if `key` is already mapped to another user.
    pub fn map_value(&self, key: &str, new_key: &str) -> Result<()> {
        self.map.map_value(key, new_key)
    }

    #[must_use]
    pub fn get_mapped_id(&self, key: &str) -> Option<String> {
        self.map.get_mapped_id(key)
    }

    /// Referenced users missing from the destination that can be created
    /// from their export details.
    #[must_use]
    pub fn users_to_auto_create(&self) -> Vec<ExternalUser> {
        self.map
            .unmapped_required()
            .iter()
            .filter_map(|key| self.user_details(key))
            .collect()
    }

    /// Referenced users missing from the destination with no export details.
    #[must_use]
    pub fn unknown_users(&self) -> Vec<String> {
        self.map
            .unmapped_required()
            .into_iter()
            .filter(|key| self.user_details(key).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(key: &str) -> ExternalUser {
        ExternalUser {
            key: key.to_string(),
            full_name: Some(format!("{key} full")),
            email: None,
        }
    }

    #[test]
    fn auto_create_needs_details_and_reference() {
        let users = UserMapper::new();
        users.register_user(user("fred"));
        users.register_user(user("wilma"));
        users.flag_mandatory("fred");
        users.flag_optional("barney");
        users.map_value("wilma", "wilma").unwrap();
        users.flag_optional("wilma");

        let create: Vec<_> = users
            .users_to_auto_create()
            .into_iter()
            .map(|u| u.key)
            .collect();
        assert_eq!(create, vec!["fred".to_string()]);
        assert_eq!(users.unknown_users(), vec!["barney".to_string()]);
        assert!(users.is_mandatory("fred"));
        assert!(!users.is_mandatory("barney"));
    }
}
