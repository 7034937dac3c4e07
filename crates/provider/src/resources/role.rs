//! Role Resource handler for Terraform
//!
//! Roles are versioned: Grafana only accepts an update whose version is
//! greater than the stored one. With `auto_increment_version` the provider
//! bumps the version itself whenever anything else about the role changes.

use anyhow::{bail, Result};
use grafana_client::{GrafanaClient, Permission, Role};
use tracing::{debug, info, warn};

use crate::error::Diagnostic;
use crate::schema::{self, Schema};
use crate::state::{
    get_bool_attr, get_int_attr, get_list_attr, get_optional_int_attr, get_optional_string_attr,
    get_string_attr, int_value, make_state, string_value, bool_value, DynamicValue,
};
use super::{changed_attributes, plan_defaults, Resource};

pub struct RoleResource;

/// Attributes that never count as a change of the role itself
const VERSIONING_ATTRIBUTES: &[&str] = &["version", "auto_increment_version", "id"];

#[async_trait::async_trait]
impl Resource for RoleResource {
    fn type_name() -> &'static str {
        "grafana_role"
    }

    fn schema() -> Schema {
        schema::role_schema()
    }

    fn validate(config: &DynamicValue) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let version = config.get("version").filter(|v| v.is_known());
        let auto_increment = get_bool_attr(config, "auto_increment_version", false);

        if version.is_some() && auto_increment {
            diagnostics.push(
                Diagnostic::error(
                    "Conflicting configuration arguments",
                    "\"version\": conflicts with auto_increment_version",
                )
                .at("version"),
            );
        }
        if matches!(version.and_then(|v| v.as_i64()), Some(v) if v < 0) {
            diagnostics.push(
                Diagnostic::error("Invalid role version", "\"version\" must be at least 0").at("version"),
            );
        }

        diagnostics
    }

    fn plan(prior: &DynamicValue, proposed: &DynamicValue, config: &DynamicValue) -> Result<DynamicValue> {
        let mut planned = plan_defaults(&Self::schema(), prior, proposed)?;
        if planned.is_null() {
            return Ok(planned);
        }
        if let Some(DynamicValue::List(permissions)) = planned.get("permissions") {
            let mut permissions = permissions.clone();
            permissions.sort_by_key(|p| (get_string_attr(p, "action"), get_string_attr(p, "scope")));
            planned.set("permissions", DynamicValue::List(permissions));
        }
        planned.set("version", int_value(planned_version(prior, &planned, config)));
        Ok(planned)
    }

    async fn create(client: &GrafanaClient, planned: &DynamicValue) -> Result<DynamicValue> {
        let role = role_from_state(planned, get_optional_string_attr(planned, "uid").unwrap_or_default());

        let created = client.new_role(&role).await?;
        info!("Created role {} (uid {}, version {})", created.name, created.uid, created.version);

        let mut state = planned.clone();
        state.set("id", string_value(&created.uid));
        match Self::read(client, &state).await? {
            Some(state) => Ok(state),
            None => bail!("role {} was not found after creation", created.uid),
        }
    }

    async fn read(client: &GrafanaClient, state: &DynamicValue) -> Result<Option<DynamicValue>> {
        let uid = role_uid(state);
        match client.get_role(&uid).await {
            Ok(role) => Ok(Some(role_to_state(&role, state))),
            Err(e) if e.is_not_found() => {
                warn!("removing role {} from state because it no longer exists in grafana", uid);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(client: &GrafanaClient, prior: &DynamicValue, planned: &DynamicValue) -> Result<DynamicValue> {
        let role = role_from_state(planned, role_uid(prior));
        if !needs_update(prior, planned) {
            // Grafana rejects a PUT that does not raise the version
            debug!("Role {} only changed local settings, skipping API call", role.uid);
            let mut state = planned.clone();
            state.set("id", string_value(&role.uid));
            return Ok(state);
        }

        client.update_role(&role).await?;
        info!("Updated role {} to version {}", role.uid, role.version);

        let mut state = planned.clone();
        state.set("id", string_value(&role.uid));
        match Self::read(client, &state).await? {
            Some(state) => Ok(state),
            None => bail!("role {} was not found after update", role.uid),
        }
    }

    async fn delete(client: &GrafanaClient, state: &DynamicValue) -> Result<()> {
        let uid = role_uid(state);
        client.delete_role(&uid, get_bool_attr(state, "global", false)).await?;
        Ok(())
    }
}

/// Version the next apply will write.
///
/// Create uses the configured version, or 1. An update with
/// `auto_increment_version` bumps the prior version when any other attribute
/// changes; otherwise the configured (or carried-over) version stands.
pub fn planned_version(prior: &DynamicValue, planned: &DynamicValue, config: &DynamicValue) -> i64 {
    let configured = get_optional_int_attr(config, "version");

    if prior.is_null() {
        return configured.filter(|v| *v > 0).unwrap_or(1);
    }

    let prior_version = get_int_attr(prior, "version", 0);
    if get_bool_attr(planned, "auto_increment_version", false)
        && !changed_attributes(prior, planned, VERSIONING_ATTRIBUTES).is_empty()
    {
        return prior_version + 1;
    }

    configured
        .or_else(|| get_optional_int_attr(planned, "version"))
        .unwrap_or(prior_version)
}

/// Whether an update has to reach Grafana: some role attribute changed or
/// the version moved.
fn needs_update(prior: &DynamicValue, planned: &DynamicValue) -> bool {
    !changed_attributes(prior, planned, VERSIONING_ATTRIBUTES).is_empty()
        || get_int_attr(planned, "version", 0) != get_int_attr(prior, "version", 0)
}

/// Role uid from state; imports only carry `id`
fn role_uid(state: &DynamicValue) -> String {
    get_optional_string_attr(state, "id")
        .or_else(|| get_optional_string_attr(state, "uid"))
        .unwrap_or_default()
}

fn role_from_state(state: &DynamicValue, uid: String) -> Role {
    let mut permissions: Vec<Permission> = get_list_attr(state, "permissions")
        .iter()
        .map(|p| Permission {
            action: get_string_attr(p, "action"),
            scope: get_string_attr(p, "scope"),
        })
        .collect();
    permissions.sort();

    Role {
        version: get_int_attr(state, "version", 1),
        uid,
        name: get_string_attr(state, "name"),
        display_name: get_string_attr(state, "display_name"),
        description: get_string_attr(state, "description"),
        group: get_string_attr(state, "group"),
        global: get_bool_attr(state, "global", false),
        hidden: get_bool_attr(state, "hidden", false),
        permissions,
        org_id: None,
    }
}

fn role_to_state(role: &Role, prior: &DynamicValue) -> DynamicValue {
    let mut permissions = role.permissions.clone();
    permissions.sort();

    make_state(vec![
        ("id", string_value(&role.uid)),
        ("uid", string_value(&role.uid)),
        ("name", string_value(&role.name)),
        ("description", string_value(&role.description)),
        ("display_name", string_value(&role.display_name)),
        ("group", string_value(&role.group)),
        ("version", int_value(role.version)),
        // local-only setting, Grafana does not store it
        ("auto_increment_version", bool_value(get_bool_attr(prior, "auto_increment_version", false))),
        ("global", bool_value(role.is_global())),
        ("hidden", bool_value(role.hidden)),
        (
            "permissions",
            DynamicValue::List(
                permissions
                    .iter()
                    .map(|p| make_state(vec![
                        ("action", string_value(&p.action)),
                        ("scope", string_value(&p.scope)),
                    ]))
                    .collect(),
            ),
        ),
    ])
}
