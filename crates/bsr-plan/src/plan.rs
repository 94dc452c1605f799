//! Control plan CSV ingestion: parses the dynamic-columns CSV format
//! into typed [`Action`]s, following a "parse permissive, validate
//! strict, name the field" approach — the raw row is deserialized
//! loosely with `serde`/`csv`, then every token is canonicalized
//! against the closed device/id/action-type sets, naming the
//! offending field in the error on failure.

use bsr_core::{Action, ActionKind, CoreError, CoreResult, DeviceKind, IdType};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// One raw CSV row, before canonicalization. Columns that don't map to
/// a fixed `PlanRow` field land in `values`, decoded from the
/// `K=V;K=V` micro-format the source plans use for per-device
/// overrides (e.g. `Gref=0.8;Vref=1.0`).
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Seq")]
    seq: u64,
    #[serde(rename = "DeviceType")]
    device_type: String,
    #[serde(rename = "IdType")]
    id_type: String,
    #[serde(rename = "IdValue")]
    id_value: String,
    #[serde(rename = "ActionType")]
    action_type: String,
    #[serde(rename = "ActionTime")]
    action_time: f64,
    #[serde(rename = "EndTime")]
    end_time: Option<f64>,
    #[serde(rename = "Values")]
    values: Option<String>,
    #[serde(rename = "TieGroup")]
    tie_group: Option<u64>,
}

fn canonicalize_device_type(raw: &str) -> CoreResult<DeviceKind> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "BUS" => Ok(DeviceKind::Bus),
        "BRN" | "BRANCH" => Ok(DeviceKind::Branch),
        "TRN" | "TRANSFORMER" => Ok(DeviceKind::Transformer),
        "LOAD" => Ok(DeviceKind::Load),
        "GEN" | "GENERATOR" => Ok(DeviceKind::Gen),
        other => Err(CoreError::UnknownDevice(other.to_string())),
    }
}

fn canonicalize_id_type(raw: &str) -> CoreResult<IdType> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "NAME" => Ok(IdType::Name),
        "NUMBER" => Ok(IdType::Number),
        "FROMTO" | "FROM_TO" => Ok(IdType::FromTo),
        other => Err(CoreError::MalformedRow(format!(
            "unknown IdType token: {other}"
        ))),
    }
}

fn canonicalize_action_type(raw: &str) -> CoreResult<ActionKind> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ON" | "CLOSE" | "ENABLE" => Ok(ActionKind::On),
        "OFF" | "TRIP" | "DISABLE" => Ok(ActionKind::Off),
        "UPDATE" => Ok(ActionKind::Update),
        other => Err(CoreError::MalformedRow(format!(
            "unknown ActionType token: {other}"
        ))),
    }
}

fn decode_values(raw: &str) -> CoreResult<HashMap<String, f64>> {
    let mut map = HashMap::new();
    for entry in raw.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            CoreError::MalformedRow(format!("Values entry missing '=': {entry}"))
        })?;
        let parsed: f64 = value.trim().parse().map_err(|_| {
            CoreError::MalformedRow(format!("Values entry {key} is not numeric: {value}"))
        })?;
        map.insert(key.trim().to_string(), parsed);
    }
    Ok(map)
}

fn canonicalize_row(raw: RawRow) -> CoreResult<Action> {
    let device_type = canonicalize_device_type(&raw.device_type)?;
    let id_type = canonicalize_id_type(&raw.id_type)?;
    let action_type = canonicalize_action_type(&raw.action_type)?;
    let values = match raw.values {
        Some(ref s) if !s.trim().is_empty() => decode_values(s)?,
        _ => HashMap::new(),
    };

    let mut action = Action::new(
        raw.seq,
        device_type,
        id_type,
        raw.id_value,
        action_type,
        raw.action_time,
    );
    action.end_time_s = raw.end_time;
    action.values = values;
    action.tie_parent = raw.tie_group;
    Ok(action)
}

/// Parse a control plan CSV file into a sequence of [`Action`]s, sorted
/// by `action_time_s` (ties broken by `seq`). A row whose device/action
/// type token doesn't resolve fails the whole load rather than being
/// silently dropped: an unparsable plan is a configuration error, not
/// a per-row skip.
pub fn load_plan(path: &Path) -> CoreResult<Vec<Action>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        CoreError::MalformedRow(format!("failed to open plan CSV {}: {e}", path.display()))
    })?;

    let mut actions = Vec::new();
    for record in reader.deserialize::<RawRow>() {
        let raw = record.map_err(|e| CoreError::MalformedRow(format!("CSV decode error: {e}")))?;
        match canonicalize_row(raw) {
            Ok(action) => actions.push(action),
            Err(err) => return Err(err),
        }
    }

    if actions.is_empty() {
        warn!(path = %path.display(), "loaded an empty control plan");
    }

    actions.sort_by(|a, b| {
        a.action_time_s
            .partial_cmp(&b.action_time_s)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });

    Ok(actions)
}
