//! Agent rows and their opaque payload
//!
//! An agent is stored as a handful of "light" columns that the simulation
//! reads every tick, plus one payload column carrying every other field as a
//! single JSON object. The payload is decoded exactly once, here, at the
//! storage boundary.

use crate::error::{Result, SimVaultError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything outside the light columns.
pub type AgentPayload = Map<String, Value>;

/// Light projection of an agent row (no payload)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub location_id: Option<String>,
    pub money: f64,
    pub energy: f64,
    pub hunger: f64,
    pub social: f64,
}

/// Full agent: light columns plus the decoded payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    #[serde(flatten)]
    pub summary: AgentSummary,

    #[serde(default)]
    pub data: AgentPayload,
}

impl AgentRecord {
    pub fn new(summary: AgentSummary) -> Self {
        Self {
            summary,
            data: AgentPayload::new(),
        }
    }

    pub fn with_data(mut self, data: AgentPayload) -> Self {
        self.data = data;
        self
    }

    pub fn id(&self) -> &str {
        &self.summary.id
    }

    /// Serialize the payload column.
    pub fn encoded_payload(&self) -> Result<String> {
        encode_payload(&self.data)
    }

    /// Rebuild a record from its stored columns.
    ///
    /// A payload that fails to decode yields a partial record carrying only
    /// the light columns, with the reason in `decode_error`.
    pub fn hydrate(summary: AgentSummary, raw_payload: Option<&str>) -> DecodedAgent {
        match decode_payload(raw_payload) {
            Ok(data) => DecodedAgent {
                record: AgentRecord { summary, data },
                decode_error: None,
            },
            Err(e) => DecodedAgent {
                record: AgentRecord::new(summary),
                decode_error: Some(e.to_string()),
            },
        }
    }
}

/// Result of hydrating one stored agent row
#[derive(Debug, Clone)]
pub struct DecodedAgent {
    pub record: AgentRecord,
    pub decode_error: Option<String>,
}

impl DecodedAgent {
    pub fn is_partial(&self) -> bool {
        self.decode_error.is_some()
    }
}

pub fn encode_payload(data: &AgentPayload) -> Result<String> {
    serde_json::to_string(data).map_err(|e| SimVaultError::Serialization(e.to_string()))
}

/// Decode a stored payload column. A missing or empty column is an empty payload.
pub fn decode_payload(raw: Option<&str>) -> Result<AgentPayload> {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(AgentPayload::new()),
    };
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(SimVaultError::Serialization(format!(
            "agent payload must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary(id: &str) -> AgentSummary {
        AgentSummary {
            id: id.to_string(),
            name: "Ada".to_string(),
            state: "idle".to_string(),
            location_id: Some("market".to_string()),
            money: 12.5,
            energy: 80.0,
            hunger: 10.0,
            social: 55.0,
        }
    }

    #[test]
    fn test_hydrate_valid_payload() {
        let decoded = AgentRecord::hydrate(summary("a1"), Some(r#"{"goals":["eat"],"age":31}"#));
        assert!(!decoded.is_partial());
        assert_eq!(decoded.record.data["age"], json!(31));
        assert_eq!(decoded.record.data["goals"], json!(["eat"]));
    }

    #[test]
    fn test_hydrate_invalid_payload_is_partial() {
        let decoded = AgentRecord::hydrate(summary("a1"), Some("not valid payload"));
        assert!(decoded.is_partial());
        assert!(decoded.record.data.is_empty());
        assert_eq!(decoded.record.summary, summary("a1"));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(decode_payload(Some("[1,2,3]")).is_err());
        assert!(decode_payload(Some("\"text\"")).is_err());
    }

    #[test]
    fn test_missing_payload_is_empty() {
        assert!(decode_payload(None).unwrap().is_empty());
        assert!(decode_payload(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn test_flattened_serde_shape() {
        let mut data = AgentPayload::new();
        data.insert("mood".into(), json!("calm"));
        let record = AgentRecord::new(summary("a2")).with_data(data);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], json!("a2"));
        assert_eq!(value["data"]["mood"], json!("calm"));
    }
}
