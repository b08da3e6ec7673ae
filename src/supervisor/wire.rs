//! Mapping of PM2 JSON payloads onto the domain model.
//!
//! Bus events carry a flattened process: the daemon copies the process's
//! `pm2_env` to the top level and drops the nested `env`, so declared
//! environment variables appear next to `name`, `pm_id` and `status`.
//! List entries keep the nesting: `{name, pm_id, pm2_env: {status, env, ...}}`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::event::{EventKind, LifecycleEvent};
use crate::models::process::{ManagedProcess, ProcessStatus};
use crate::{AppError, Result};

/// Parse a `process:event` bus payload.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if the payload lacks `event`, `process`,
/// or the process's `name`/`pm_id`.
pub fn parse_bus_event(payload: &Value) -> Result<LifecycleEvent> {
    let kind = payload
        .get("event")
        .and_then(Value::as_str)
        .map(EventKind::from_wire)
        .ok_or_else(|| AppError::Protocol("bus event missing 'event'".into()))?;

    let manual = payload
        .get("manually")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let fields = payload
        .get("process")
        .and_then(Value::as_object)
        .ok_or_else(|| AppError::Protocol("bus event missing 'process'".into()))?;

    let mut process = process_from_fields(fields, fields).ok_or_else(|| {
        AppError::Protocol("bus event process missing 'name' or 'pm_id'".into())
    })?;
    process.restarted_manually = manual;

    let at = payload
        .get("at")
        .and_then(Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    Ok(LifecycleEvent {
        kind,
        process,
        manual,
        at,
    })
}

/// Parse the reply payload of `getMonitorData` into process snapshots.
///
/// Entries without `pm2_env`, `name`, or `pm_id` are skipped.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if the payload is not an array.
pub fn parse_process_list(payload: &Value) -> Result<Vec<ManagedProcess>> {
    let entries = payload
        .as_array()
        .ok_or_else(|| AppError::Protocol("process list is not an array".into()))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let parsed = parse_list_entry(entry);
            if parsed.is_none() {
                debug!(?entry, "skipping incomplete process list entry");
            }
            parsed
        })
        .collect())
}

fn parse_list_entry(entry: &Value) -> Option<ManagedProcess> {
    let top = entry.as_object()?;
    let pm2_env = top.get("pm2_env")?.as_object()?;
    process_from_fields(top, pm2_env)
}

/// Build a snapshot from identity fields (`name`, `pm_id`) in `identity`
/// and status plus environment in `env_fields`. Falls back to
/// `env_fields` for identity when `identity` lacks it.
fn process_from_fields(
    identity: &Map<String, Value>,
    env_fields: &Map<String, Value>,
) -> Option<ManagedProcess> {
    let name = identity
        .get("name")
        .or_else(|| env_fields.get("name"))?
        .as_str()?
        .to_owned();
    let id = identity
        .get("pm_id")
        .or_else(|| env_fields.get("pm_id"))?
        .as_u64()?;
    let status = env_fields
        .get("status")
        .and_then(Value::as_str)
        .map_or(ProcessStatus::Unknown, ProcessStatus::from_wire);

    Some(ManagedProcess {
        name,
        id,
        status,
        environment: collect_environment(env_fields),
        restarted_manually: false,
    })
}

/// String-valued fields of `fields` and of its nested `env` object. Top-level
/// values win over nested ones.
fn collect_environment(fields: &Map<String, Value>) -> HashMap<String, String> {
    let mut environment: HashMap<String, String> = fields
        .get("env")
        .and_then(Value::as_object)
        .map(string_entries)
        .unwrap_or_default();
    environment.extend(string_entries(fields));
    environment
}

fn string_entries(fields: &Map<String, Value>) -> HashMap<String, String> {
    fields
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
        .collect()
}
