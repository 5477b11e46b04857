//! Name-based automatic mapping.
//!
//! Matching is exact. A value scoped to the destination project beats a
//! global one; values scoped to other projects are never used. Ids that are
//! already mapped (manually or by an earlier round) are left alone.

use super::MappingContext;
use crate::error::{ImportError, Result};
use crate::mapper::{IdentityMap, ImportMapper};
use crate::storage::{DestinationCustomField, DestinationOption, ReferenceKind, ReferenceValue};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const PHASE: &str = "auto-mapping";

/// Map everything that can be matched by name.
///
/// Issue types go first: status and custom-field matching depend on them.
///
/// # Errors
///
/// Returns an error if a destination lookup fails or an id would be
/// re-mapped to a different destination id.
pub fn auto_map(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<()> {
    if let Some(destination) = &ctx.destination {
        mapper.projects.map_value(ctx.project.id(), &destination.id)?;
    }
    map_reference(ctx, &mapper.issue_types, ReferenceKind::IssueType)?;
    map_statuses(ctx, mapper)?;
    for (map, kind) in [
        (&mapper.priorities, ReferenceKind::Priority),
        (&mapper.resolutions, ReferenceKind::Resolution),
        (&mapper.project_roles, ReferenceKind::ProjectRole),
        (&mapper.issue_link_types, ReferenceKind::IssueLinkType),
        (&mapper.issue_security_levels, ReferenceKind::IssueSecurityLevel),
    ] {
        map_reference(ctx, map, kind)?;
    }
    map_users(ctx, mapper)?;
    map_groups(ctx, mapper)?;
    map_custom_fields(ctx, mapper)?;
    map_custom_field_options(ctx, mapper)?;
    tracing::debug!(project = ctx.project.key(), "Automatic mapping finished");
    Ok(())
}

/// Best same-named value: project-scoped first, then global.
pub(crate) fn best_match<'v>(
    values: &'v [ReferenceValue],
    name: &str,
    project_id: Option<&str>,
) -> Option<&'v ReferenceValue> {
    let mut global = None;
    for value in values.iter().filter(|value| value.name == name) {
        match (value.project_id.as_deref(), project_id) {
            (Some(scope), Some(project)) if scope == project => return Some(value),
            (None, _) => {
                global.get_or_insert(value);
            }
            _ => {}
        }
    }
    global
}

/// Registered, still-unmapped old ids with their names.
fn unmapped_with_names(map: &IdentityMap) -> Vec<(String, String)> {
    map.registered_old_ids()
        .into_iter()
        .filter(|id| map.get_mapped_id(id).is_none())
        .filter_map(|id| map.old_name(&id).map(|name| (id, name)))
        .collect()
}

fn map_reference(ctx: &MappingContext<'_>, map: &IdentityMap, kind: ReferenceKind) -> Result<()> {
    let values = ctx
        .store
        .reference_values(kind)
        .map_err(|e| ImportError::store(PHASE, e))?;
    for (old_id, name) in unmapped_with_names(map) {
        if let Some(value) = best_match(&values, &name, ctx.destination_project_id()) {
            tracing::trace!(%kind, old_id, new_id = %value.id, "Mapped by name");
            map.map_value(&old_id, &value.id)?;
        }
    }
    Ok(())
}

/// Destination workflow lookups, cached per destination issue type.
pub(crate) struct WorkflowCache<'c, 'a> {
    ctx: &'c MappingContext<'a>,
    statuses: HashMap<String, Option<Vec<String>>>,
}

impl<'c, 'a> WorkflowCache<'c, 'a> {
    pub(crate) fn new(ctx: &'c MappingContext<'a>) -> Self {
        Self {
            ctx,
            statuses: HashMap::new(),
        }
    }

    /// Whether `status_id` is allowed by the workflow of `issue_type_id`.
    pub(crate) fn allows(&mut self, issue_type_id: &str, status_id: &str) -> Result<bool> {
        if !self.statuses.contains_key(issue_type_id) {
            let statuses = self
                .ctx
                .store
                .workflow_statuses(issue_type_id)
                .map_err(|e| ImportError::store(PHASE, e))?;
            self.statuses.insert(issue_type_id.to_string(), statuses);
        }
        Ok(self
            .statuses
            .get(issue_type_id)
            .and_then(Option::as_ref)
            .is_none_or(|statuses| statuses.iter().any(|id| id == status_id)))
    }
}

/// Old issue type ids in use, per old status id.
pub(crate) fn issue_types_by_status(mapper: &ImportMapper) -> BTreeMap<String, BTreeSet<String>> {
    let mut by_status: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (issue_type, statuses) in mapper.statuses_by_issue_type() {
        for status in statuses {
            by_status
                .entry(status)
                .or_default()
                .insert(issue_type.clone());
        }
    }
    by_status
}

/// A status is only mapped when the candidate is valid for the workflow of
/// every (mapped) issue type it is used with.
fn map_statuses(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<()> {
    let values = ctx
        .store
        .reference_values(ReferenceKind::Status)
        .map_err(|e| ImportError::store(PHASE, e))?;
    let in_use = issue_types_by_status(mapper);
    let mut workflows = WorkflowCache::new(ctx);

    for (old_id, name) in unmapped_with_names(&mapper.statuses) {
        let Some(candidate) = best_match(&values, &name, ctx.destination_project_id()) else {
            continue;
        };
        let mut valid = true;
        for old_type in in_use.get(&old_id).into_iter().flatten() {
            if let Some(new_type) = mapper.issue_types.get_mapped_id(old_type) {
                if !workflows.allows(&new_type, &candidate.id)? {
                    valid = false;
                    break;
                }
            }
        }
        if valid {
            mapper.statuses.map_value(&old_id, &candidate.id)?;
        } else {
            tracing::debug!(old_id, name, "Status exists but is not valid for every issue type");
        }
    }
    Ok(())
}

fn map_users(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<()> {
    let users = mapper.users.identity();
    for key in users.unmapped_required() {
        if ctx
            .store
            .user_exists(&key)
            .map_err(|e| ImportError::store(PHASE, e))?
        {
            users.map_value(&key, &key)?;
        }
    }
    Ok(())
}

fn map_groups(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<()> {
    for name in mapper.groups.unmapped_required() {
        if ctx
            .store
            .group_exists(&name)
            .map_err(|e| ImportError::store(PHASE, e))?
        {
            mapper.groups.map_value(&name, &name)?;
        }
    }
    Ok(())
}

/// Mapped destination issue types a field must apply to.
pub(crate) fn mapped_issue_types(mapper: &ImportMapper, field_id: &str) -> Vec<String> {
    mapper
        .custom_fields
        .issue_types_in_use(field_id)
        .iter()
        .filter_map(|old| mapper.issue_types.get_mapped_id(old))
        .collect()
}

/// Whether a destination field can hold the values of `field_id`.
pub(crate) fn field_accepts(
    ctx: &MappingContext<'_>,
    mapper: &ImportMapper,
    field_id: &str,
    candidate: &DestinationCustomField,
) -> bool {
    let Some(field) = mapper.custom_fields.field(field_id) else {
        return false;
    };
    candidate.type_key == field.type_key
        && candidate.applies_to_project(ctx.destination_project_id())
        && mapped_issue_types(mapper, field_id)
            .iter()
            .all(|issue_type| candidate.applies_to_issue_type(issue_type))
}

fn map_custom_fields(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<()> {
    let fields = &mapper.custom_fields;
    let destination = ctx
        .store
        .custom_fields()
        .map_err(|e| ImportError::store(PHASE, e))?;

    for field_id in fields.fields_in_use() {
        if fields.get_mapped_id(&field_id).is_some() {
            continue;
        }
        let Some(field) = fields.field(&field_id) else {
            continue;
        };
        let candidates: Vec<_> = destination
            .iter()
            .filter(|candidate| candidate.name == field.name)
            .filter(|candidate| field_accepts(ctx, mapper, &field_id, candidate))
            .collect();
        let chosen = candidates
            .iter()
            .find(|candidate| candidate.project_ids.is_some())
            .or_else(|| candidates.first());
        if let Some(chosen) = chosen {
            fields.identity().map_value(&field_id, &chosen.id)?;
        }
    }
    Ok(())
}

fn map_custom_field_options(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<()> {
    let options = &mapper.custom_field_options;

    // Parents of required children must be mapped first.
    let mut worklist: BTreeSet<(bool, String)> = BTreeSet::new();
    for option_id in options.identity().unmapped_required() {
        if let Some(info) = options.option(&option_id) {
            if let Some(parent) = &info.parent_id {
                worklist.insert((false, parent.clone()));
            }
            worklist.insert((info.parent_id.is_some(), option_id));
        }
    }

    let mut destination: HashMap<String, Vec<DestinationOption>> = HashMap::new();
    for (_, option_id) in worklist {
        if options.get_mapped_id(&option_id).is_some() {
            continue;
        }
        let Some(info) = options.option(&option_id) else {
            continue;
        };
        let Some(new_field) = mapper.custom_fields.get_mapped_id(&info.field_id) else {
            continue;
        };
        let new_parent = match &info.parent_id {
            Some(parent) => match options.get_mapped_id(parent) {
                Some(new_parent) => Some(new_parent),
                None => continue,
            },
            None => None,
        };
        if !destination.contains_key(&new_field) {
            let loaded = ctx
                .store
                .custom_field_options(&new_field)
                .map_err(|e| ImportError::store(PHASE, e))?;
            destination.insert(new_field.clone(), loaded);
        }
        let matched = destination.get(&new_field).and_then(|candidates| {
            candidates
                .iter()
                .find(|candidate| candidate.value == info.value && candidate.parent_id == new_parent)
        });
        if let Some(matched) = matched {
            options.identity().map_value(&option_id, &matched.id)?;
        }
    }
    Ok(())
}
