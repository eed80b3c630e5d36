//! The dashboard's shared flags: partial merge, change-only logging.
//!
//! Every read refreshes `updated_at` in the returned document, so the field
//! means "last observed" rather than "last modified". Dashboards key off this.

use std::fmt;

use chrono::{DateTime, Utc};
use common::req::State;
use log::{info, warn};
use serde_json::Value;

use crate::{error::ApiError, req::Params, store::Store, utils::log_timestamp};

/// Boolean coercion for loosely typed clients.
///
/// * `true`/`false` map to themselves, `null` is false.
/// * Numbers are false only when zero.
/// * Strings are trimmed and compared case-insensitively: `1 true on yes`
///   are true, `0 false off no` and the empty string are false. Any other
///   string is true.
/// * Arrays and objects are false only when empty.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => true,
            "0" | "false" | "off" | "no" | "" => false,
            _ => true,
        },
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Fields present in an update request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub mode: Option<bool>,
    pub reset_finish: Option<bool>,
}

impl StatePatch {
    pub fn from_params(params: &Params) -> Self {
        Self {
            mode: params.get_present("mode").map(coerce_bool),
            reset_finish: params.get_present("reset_finish").map(coerce_bool),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Mode(bool),
    ResetFinish(bool),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Mode(on) => write!(f, "mode={}", if *on { "ON" } else { "OFF" }),
            Change::ResetFinish(v) => write!(f, "reset_finish={}", v),
        }
    }
}

/// Merge `patch` into `state`, returning only the fields that flipped.
pub fn apply(state: &mut State, patch: StatePatch) -> Vec<Change> {
    let mut changes = Vec::new();
    if let Some(mode) = patch.mode.filter(|m| *m != state.mode) {
        state.mode = mode;
        changes.push(Change::Mode(mode));
    }
    if let Some(reset) = patch.reset_finish.filter(|r| *r != state.reset_finish) {
        state.reset_finish = reset;
        changes.push(Change::ResetFinish(reset));
    }
    changes
}

pub fn log_line(changes: &[Change], peer: &str, now: DateTime<Utc>) -> String {
    let changes = changes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}] STATE {} ip={}\n", log_timestamp(now), changes, peer)
}

fn load(store: &Store) -> Option<State> {
    match store.state.load() {
        Ok(state) => state,
        Err(e) => {
            warn!(
                "{} unreadable, using defaults: {}",
                store.state.path().display(),
                e
            );
            Some(State::default())
        }
    }
}

/// Current state for a read. Creates the document with defaults if absent.
pub fn observe(store: &Store, now: DateTime<Utc>) -> State {
    let mut state = match load(store) {
        Some(state) => state,
        None => {
            let state = State {
                updated_at: now.timestamp(),
                ..State::default()
            };
            if let Err(e) = store.state.save(&state) {
                warn!("Failed to create state document: {}", e);
            }
            state
        }
    };
    state.updated_at = now.timestamp();
    state
}

/// Merge an update request and persist the result.
pub fn update(
    store: &Store,
    params: &Params,
    peer: &str,
    now: DateTime<Utc>,
) -> Result<State, ApiError> {
    let mut state = load(store).unwrap_or_default();
    let changes = apply(&mut state, StatePatch::from_params(params));
    state.updated_at = now.timestamp();

    store.state.save(&state).map_err(ApiError::WriteFailed)?;

    if !changes.is_empty() {
        let line = log_line(&changes, peer, now);
        info!("State changed by {}: {}", peer, line.trim_end());
        if let Err(e) = store.log.append(&line) {
            warn!("Failed to append to {}: {}", store.log.path().display(), e);
        }
    }

    Ok(state)
}
