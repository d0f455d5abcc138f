use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered machine on the mesh, as reported by the control API.
/// Online state and timestamps are upstream-authoritative; we never compute
/// them locally, only relay them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning user, embedded by the control API on node responses.
    #[serde(default)]
    pub user: Option<User>,
}

/// A namespace/user on the control server. Owns nodes and pre-auth keys,
/// resolved by secondary calls keyed on the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A control-API-issued credential that lets a node join without
/// interactive approval. Consumption and expiry are tracked upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreauthKey {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub reusable: bool,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Point-in-time aggregate over the three upstream list calls. Derived,
/// never persisted; any two snapshots are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub total_users: usize,
    pub total_preauth_keys: usize,
}

/// One user's detail view: the user plus their nodes and pre-auth keys.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub user: User,
    pub nodes: Vec<Node>,
    pub preauth_keys: Vec<PreauthKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_parses_with_null_timestamps() {
        let raw = r#"{
            "id": "7",
            "name": "laptop",
            "online": true,
            "lastSeen": null,
            "createdAt": "2025-03-01T12:00:00Z",
            "ipAddresses": ["100.64.0.7"],
            "user": {"id": "1", "name": "alice", "createdAt": null}
        }"#;
        let node: Node = serde_json::from_str(raw).unwrap();
        assert!(node.online);
        assert!(node.last_seen.is_none());
        assert!(node.created_at.is_some());
        assert_eq!(node.user.unwrap().name, "alice");
    }

    #[test]
    fn node_parses_with_missing_fields() {
        let node: Node = serde_json::from_str(r#"{"id": "1"}"#).unwrap();
        assert!(!node.online);
        assert!(node.tags.is_empty());
        assert!(node.user.is_none());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snap = Snapshot {
            total_nodes: 5,
            online_nodes: 3,
            total_users: 2,
            total_preauth_keys: 1,
        };
        let value = serde_json::to_value(snap).unwrap();
        assert_eq!(value["totalNodes"], 5);
        assert_eq!(value["onlineNodes"], 3);
        assert_eq!(value["totalUsers"], 2);
        assert_eq!(value["totalPreauthKeys"], 1);
    }
}
