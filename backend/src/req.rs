use actix_web::{web, HttpRequest};
use serde_json::{Map, Value};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Named request fields collected from one or more transports.
///
/// Sources are searched in order and the first non-null value wins, so a
/// body field shadows a query parameter of the same name.
#[derive(Debug, Default)]
pub struct Params {
    sources: Vec<Map<String, Value>>,
}

impl Params {
    pub fn new(sources: Vec<Map<String, Value>>) -> Self {
        Self { sources }
    }

    /// Body fields followed by query parameters.
    pub fn from_request(req: &HttpRequest, body: &[u8]) -> Self {
        Self::new(vec![body_fields(body), form_fields(req.query_string())])
    }

    /// Body fields only.
    pub fn from_body(body: &[u8]) -> Self {
        Self::new(vec![body_fields(body)])
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.sources
            .iter()
            .filter_map(|source| source.get(key))
            .find(|v| !v.is_null())
    }

    /// Like [`Params::get`] but an explicit `null` counts as present.
    pub fn get_present(&self, key: &str) -> Option<&Value> {
        self.sources.iter().find_map(|source| source.get(key))
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(value_text)
    }
}

/// A JSON object body, or form-encoded fields when the body is anything else.
pub fn body_fields(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => form_fields(std::str::from_utf8(body).unwrap_or_default()),
    }
}

pub fn form_fields(encoded: &str) -> Map<String, Value> {
    web::Query::<Vec<(String, String)>>::from_query(encoded)
        .map(|q| {
            q.into_inner()
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect()
        })
        .unwrap_or_default()
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON numbers and numeric strings.
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lenient integer coercion: floats truncate toward zero, booleans are 0/1,
/// anything unparseable is 0.
pub fn value_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// The shared secret from the `X-API-Key` header, if set and non-empty.
pub fn header_api_key(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

pub fn peer_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
