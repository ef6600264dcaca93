//! Server set member record
//!
//! Each member node holds a JSON document in the Finagle server set format:
//!
//! ```json
//! {"serviceEndpoint":{"host":"10.0.0.5","port":8080},"additionalEndpoints":{},"shard":0,"status":"ALIVE"}
//! ```
//!
//! Field names and nesting are shared with Finagle, Aurora and other server set
//! consumers, so they must not change.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

// Namespace defaults
pub const DEFAULT_BASE_DIRECTORY: &str = "/aurora";
/// Prefix of the sequential ephemeral member nodes; `member_` is what Finagle uses.
pub const DEFAULT_MEMBER_PREFIX: &str = "member_";

/// Member status as published in the `status` field.
///
/// Only `ALIVE` members are treated as serving. The other values exist for
/// consumers that filter on them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Dead,
    Starting,
    Alive,
    Stopping,
    Stopped,
    Warning,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Dead => "DEAD",
            Status::Starting => "STARTING",
            Status::Alive => "ALIVE",
            Status::Stopping => "STOPPING",
            Status::Stopped => "STOPPED",
            Status::Warning => "WARNING",
            Status::Unknown => "UNKNOWN",
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, Status::Alive)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "DEAD" => Status::Dead,
            "STARTING" => Status::Starting,
            "ALIVE" => Status::Alive,
            "STOPPING" => Status::Stopping,
            "STOPPED" => Status::Stopped,
            "WARNING" => Status::Warning,
            _ => Status::Unknown,
        })
    }
}

/// A host/port pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: i32,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Payload of one member node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub service_endpoint: Endpoint,
    /// Named secondary endpoints. Always serialized, as `{}` when empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub additional_endpoints: BTreeMap<String, Endpoint>,
    #[serde(default)]
    pub shard: i64,
    #[serde(default)]
    pub status: Status,
}

impl Entity {
    /// A fresh ALIVE record for `host:port` on shard 0.
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        Self {
            service_endpoint: Endpoint::new(host, port),
            additional_endpoints: BTreeMap::new(),
            shard: 0,
            status: Status::Alive,
        }
    }

    pub fn with_additional_endpoint(
        mut self,
        label: impl Into<String>,
        host: impl Into<String>,
        port: i32,
    ) -> Self {
        self.additional_endpoints
            .insert(label.into(), Endpoint::new(host, port));
        self
    }

    pub fn with_shard(mut self, shard: i64) -> Self {
        self.shard = shard;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

// Some writers emit `null` for an empty map.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_new_defaults() {
        let entity = Entity::new("10.0.0.5", 8080);
        assert_eq!(entity.service_endpoint, Endpoint::new("10.0.0.5", 8080));
        assert!(entity.additional_endpoints.is_empty());
        assert_eq!(entity.shard, 0);
        assert_eq!(entity.status, Status::Alive);
    }

    #[test]
    fn test_entity_exact_wire_format() {
        let entity = Entity::new("10.0.0.5", 8080);
        let json = String::from_utf8(entity.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"serviceEndpoint":{"host":"10.0.0.5","port":8080},"additionalEndpoints":{},"shard":0,"status":"ALIVE"}"#
        );
    }

    #[test]
    fn test_entity_with_additional_endpoints() {
        let entity = Entity::new("host-a", 9000)
            .with_additional_endpoint("http", "host-a", 9001)
            .with_additional_endpoint("admin", "host-a", 9990)
            .with_shard(3)
            .with_status(Status::Starting);

        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(
            value,
            json!({
                "serviceEndpoint": {"host": "host-a", "port": 9000},
                "additionalEndpoints": {
                    "admin": {"host": "host-a", "port": 9990},
                    "http": {"host": "host-a", "port": 9001}
                },
                "shard": 3,
                "status": "STARTING"
            })
        );
    }

    #[test]
    fn test_entity_from_finagle_payload() {
        let payload = br#"{"serviceEndpoint":{"host":"h","port":1},"additionalEndpoints":null,"shard":2,"status":"STOPPING"}"#;
        let entity = Entity::from_json(payload).unwrap();
        assert_eq!(entity.service_endpoint.to_string(), "h:1");
        assert!(entity.additional_endpoints.is_empty());
        assert_eq!(entity.shard, 2);
        assert_eq!(entity.status, Status::Stopping);
    }

    #[test]
    fn test_entity_missing_optional_fields() {
        let payload = br#"{"serviceEndpoint":{"host":"h","port":1}}"#;
        let entity = Entity::from_json(payload).unwrap();
        assert!(entity.additional_endpoints.is_empty());
        assert_eq!(entity.shard, 0);
        assert_eq!(entity.status, Status::Unknown);
    }

    #[test]
    fn test_unrecognized_status_is_unknown() {
        let payload = br#"{"serviceEndpoint":{"host":"h","port":1},"additionalEndpoints":{},"shard":0,"status":"DRAINING"}"#;
        let entity = Entity::from_json(payload).unwrap();
        assert_eq!(entity.status, Status::Unknown);
    }

    #[test]
    fn test_status_strings() {
        let all = [
            (Status::Dead, "DEAD"),
            (Status::Starting, "STARTING"),
            (Status::Alive, "ALIVE"),
            (Status::Stopping, "STOPPING"),
            (Status::Stopped, "STOPPED"),
            (Status::Warning, "WARNING"),
            (Status::Unknown, "UNKNOWN"),
        ];
        for (status, name) in all {
            assert_eq!(status.to_string(), name);
            assert_eq!(name.parse::<Status>().unwrap(), status);
            assert_eq!(serde_json::to_value(status).unwrap(), json!(name));
        }
        assert!(Status::Alive.is_alive());
        assert!(!Status::Warning.is_alive());
    }

    #[test]
    fn test_invalid_payload() {
        assert!(Entity::from_json(b"{}").is_err());
        assert!(Entity::from_json(b"not json").is_err());
    }
}
