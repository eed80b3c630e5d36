/// Default value of the `mode` flag when no state has been stored yet.
pub const DEFAULT_MODE: bool = true;

/// Latest sensor sample as persisted and served back to the dashboard.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Reading {
    pub device: String,
    pub temperature: f64, // °C
    pub humidity: f64,    // percent
    pub time: i64,        // s
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i64>, // dBm
}

/// Shared dashboard flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct State {
    #[serde(default = "default_mode")]
    pub mode: bool,
    #[serde(default)]
    pub reset_finish: bool,
    #[serde(default)]
    pub updated_at: i64, // s
}

fn default_mode() -> bool {
    DEFAULT_MODE
}

impl Default for State {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE,
            reset_finish: false,
            updated_at: 0,
        }
    }
}

/// A slice of the event log starting at some byte offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LogChunk {
    /// Offset to ask for on the next poll.
    pub offset: u64,
    pub chunk: String,
    /// Size of the log when the chunk was read.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub saved: Reading,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub err: String,
}

impl ErrorResponse {
    pub fn new(err: impl Into<String>) -> Self {
        Self {
            ok: false,
            err: err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_without_rssi_omits_the_field() {
        let reading = Reading {
            device: "medbot-01".to_string(),
            temperature: 21.5,
            humidity: 40.0,
            time: 1_700_000_000,
            brand: "medbot".to_string(),
            rssi: None,
        };

        let json = serde_json::to_value(&reading).unwrap();
        assert!(json.get("rssi").is_none());
    }

    #[test]
    fn partial_state_document_fills_defaults() {
        let state: State = serde_json::from_str(r#"{"reset_finish": true}"#).unwrap();
        assert!(state.mode);
        assert!(state.reset_finish);
        assert_eq!(state.updated_at, 0);

        let state: State = serde_json::from_str("{}").unwrap();
        assert_eq!(state, State::default());
    }
}
