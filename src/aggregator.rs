//! Fan-out layer over the upstream clients. The dashboard never talks to the
//! control API directly; everything goes through here so the render path and
//! the push path observe the same read model.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::models::{Node, PreauthKey, Snapshot, User, UserDetail};
use crate::upstream::{MetricsClient, UpstreamClient, UpstreamError};

pub struct Aggregator {
    upstream: Arc<UpstreamClient>,
    metrics: Arc<MetricsClient>,
}

impl Aggregator {
    pub fn new(upstream: Arc<UpstreamClient>, metrics: Arc<MetricsClient>) -> Self {
        Self { upstream, metrics }
    }

    /// Builds a stats snapshot from three concurrent list calls. Each call's
    /// failure is isolated: it contributes zero/empty to its own field and
    /// leaves the other two untouched, so this operation as a whole never
    /// fails. A caller cannot distinguish "zero nodes" from "node call
    /// failed"; the warning log is the only trace.
    pub async fn fetch_snapshot(&self) -> Snapshot {
        let (nodes, users, keys) = tokio::join!(
            self.upstream.get_json::<Vec<Node>>("node"),
            self.upstream.get_json::<Vec<User>>("user"),
            self.upstream.get_json::<Vec<PreauthKey>>("preauthkey"),
        );

        let nodes = nodes.unwrap_or_else(|e| {
            warn!(error = %e, "node list unavailable, reporting zero nodes");
            Vec::new()
        });
        let users = users.unwrap_or_else(|e| {
            warn!(error = %e, "user list unavailable, reporting zero users");
            Vec::new()
        });
        let keys = keys.unwrap_or_else(|e| {
            warn!(error = %e, "preauth key list unavailable, reporting zero keys");
            Vec::new()
        });

        Snapshot {
            total_nodes: nodes.len(),
            online_nodes: nodes.iter().filter(|n| n.online).count(),
            total_users: users.len(),
            total_preauth_keys: keys.len(),
        }
    }

    /// One user plus their nodes and pre-auth keys, fetched concurrently.
    /// The user call is primary: if it fails the whole detail is "not
    /// found", whatever the secondaries returned. Secondary failures only
    /// degrade their own list to empty.
    pub async fn fetch_user_detail(&self, id: &str) -> Result<UserDetail, UpstreamError> {
        let user_path = format!("user/{id}");
        let nodes_path = format!("user/{id}/node");
        let keys_path = format!("user/{id}/preauthkey");
        let (user, nodes, keys) = tokio::join!(
            self.upstream.get_json::<User>(&user_path),
            self.upstream.get_json::<Vec<Node>>(&nodes_path),
            self.upstream.get_json::<Vec<PreauthKey>>(&keys_path),
        );

        let user = user.map_err(|e| {
            warn!(user = id, error = %e, "user lookup failed");
            UpstreamError::NotFound
        })?;

        Ok(UserDetail {
            user,
            nodes: nodes.unwrap_or_default(),
            preauth_keys: keys.unwrap_or_default(),
        })
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, UpstreamError> {
        self.upstream.get_json("node").await
    }

    pub async fn get_node(&self, id: &str) -> Result<Node, UpstreamError> {
        self.upstream.get_json(&format!("node/{id}")).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, UpstreamError> {
        self.upstream.get_json("user").await
    }

    pub async fn status(&self) -> Result<serde_json::Value, UpstreamError> {
        self.upstream.get_json("status").await
    }

    pub async fn query_metrics(
        &self,
        expr: &str,
    ) -> Result<Option<serde_json::Value>, UpstreamError> {
        self.metrics.query(expr).await
    }

    // Mutations are single pass-throughs: the upstream executes, we relay.
    // On failure the error surfaces to the caller unchanged; there is no
    // local state to roll back.

    pub async fn rename_node(
        &self,
        id: &str,
        name: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        self.upstream
            .post_json(&format!("node/{id}/rename"), &json!({ "name": name.trim() }))
            .await
    }

    pub async fn set_node_tags(
        &self,
        id: &str,
        tags: &[String],
    ) -> Result<serde_json::Value, UpstreamError> {
        self.upstream
            .post_json(&format!("node/{id}/tags"), &json!({ "tags": tags }))
            .await
    }

    pub async fn expire_node(&self, id: &str) -> Result<serde_json::Value, UpstreamError> {
        self.upstream
            .post_json(&format!("node/{id}/expire"), &json!({}))
            .await
    }

    pub async fn delete_node(&self, id: &str) -> Result<serde_json::Value, UpstreamError> {
        self.upstream.delete(&format!("node/{id}")).await
    }

    pub async fn create_user(&self, name: &str) -> Result<serde_json::Value, UpstreamError> {
        self.upstream
            .post_json("user", &json!({ "name": name.trim() }))
            .await
    }

    pub async fn rename_user(
        &self,
        id: &str,
        name: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        self.upstream
            .put_json(&format!("user/{id}"), &json!({ "name": name.trim() }))
            .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<serde_json::Value, UpstreamError> {
        self.upstream.delete(&format!("user/{id}")).await
    }

    pub async fn create_preauth_key(
        &self,
        user: &str,
        expiration: &str,
        reusable: bool,
        tags: &[String],
    ) -> Result<serde_json::Value, UpstreamError> {
        self.upstream
            .post_json(
                "preauthkey",
                &json!({
                    "user": user,
                    "expiration": expiration,
                    "reusable": reusable,
                    "tags": tags,
                }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};

    const API_KEY: &str = "test-key";

    /// Serves the given router on a loopback port and returns its base URL.
    async fn spawn_control_api(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn aggregator_for(base_url: &str) -> Aggregator {
        Aggregator::new(
            Arc::new(UpstreamClient::new(base_url, API_KEY).unwrap()),
            Arc::new(MetricsClient::new(None).unwrap()),
        )
    }

    fn nodes_body() -> Value {
        json!([
            {"id": "1", "name": "alpha", "online": true},
            {"id": "2", "name": "bravo", "online": false},
            {"id": "3", "name": "charlie", "online": true},
            {"id": "4", "name": "delta", "online": false, "lastSeen": null},
            {"id": "5", "name": "echo", "online": false},
        ])
    }

    fn users_body() -> Value {
        json!([
            {"id": "1", "name": "alice"},
            {"id": "2", "name": "bob", "createdAt": null},
        ])
    }

    fn keys_body() -> Value {
        json!([
            {"id": "1", "key": "k1", "user": "alice", "reusable": true},
            {"id": "2", "key": "k2", "user": "alice"},
            {"id": "3", "key": "k3", "user": "bob"},
        ])
    }

    #[tokio::test]
    async fn snapshot_counts_match_fulfilled_responses() {
        let router = Router::new()
            .route("/api/v1/node", get(|| async { Json(nodes_body()) }))
            .route("/api/v1/user", get(|| async { Json(users_body()) }))
            .route("/api/v1/preauthkey", get(|| async { Json(keys_body()) }));
        let base = spawn_control_api(router).await;

        let snapshot = aggregator_for(&base).fetch_snapshot().await;
        assert_eq!(
            snapshot,
            Snapshot {
                total_nodes: 5,
                online_nodes: 2,
                total_users: 2,
                total_preauth_keys: 3,
            }
        );
    }

    #[tokio::test]
    async fn one_failed_call_zeroes_only_its_own_field() {
        // Users endpoint is down; nodes and keys answer normally.
        let router = Router::new()
            .route("/api/v1/node", get(|| async { Json(nodes_body()) }))
            .route(
                "/api/v1/user",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route("/api/v1/preauthkey", get(|| async { Json(keys_body()) }));
        let base = spawn_control_api(router).await;

        let snapshot = aggregator_for(&base).fetch_snapshot().await;
        assert_eq!(snapshot.total_users, 0);
        assert_eq!(snapshot.total_nodes, 5);
        assert_eq!(snapshot.online_nodes, 2);
        assert_eq!(snapshot.total_preauth_keys, 3);
    }

    #[tokio::test]
    async fn failed_node_call_zeroes_both_node_counts() {
        let router = Router::new()
            .route("/api/v1/node", get(|| async { StatusCode::BAD_GATEWAY }))
            .route("/api/v1/user", get(|| async { Json(users_body()) }))
            .route("/api/v1/preauthkey", get(|| async { Json(keys_body()) }));
        let base = spawn_control_api(router).await;

        let snapshot = aggregator_for(&base).fetch_snapshot().await;
        assert_eq!(snapshot.total_nodes, 0);
        assert_eq!(snapshot.online_nodes, 0);
        assert_eq!(snapshot.total_users, 2);
    }

    #[tokio::test]
    async fn unreachable_upstream_yields_all_zero_snapshot() {
        // Bind then drop the listener so the port actively refuses.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let snapshot = aggregator_for(&format!("http://{addr}"))
            .fetch_snapshot()
            .await;
        assert_eq!(snapshot, Snapshot::default());
    }

    #[tokio::test]
    async fn user_detail_is_not_found_when_primary_call_fails() {
        // Secondaries succeed; only the user lookup itself 404s.
        let router = Router::new()
            .route("/api/v1/user/9", get(|| async { StatusCode::NOT_FOUND }))
            .route("/api/v1/user/9/node", get(|| async { Json(nodes_body()) }))
            .route("/api/v1/user/9/preauthkey", get(|| async { Json(keys_body()) }));
        let base = spawn_control_api(router).await;

        let result = aggregator_for(&base).fetch_user_detail("9").await;
        assert!(matches!(result, Err(UpstreamError::NotFound)));
    }

    #[tokio::test]
    async fn user_detail_tolerates_secondary_failures() {
        let router = Router::new()
            .route(
                "/api/v1/user/1",
                get(|| async { Json(json!({"id": "1", "name": "alice"})) }),
            )
            .route(
                "/api/v1/user/1/node",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route("/api/v1/user/1/preauthkey", get(|| async { Json(keys_body()) }));
        let base = spawn_control_api(router).await;

        let detail = aggregator_for(&base).fetch_user_detail("1").await.unwrap();
        assert_eq!(detail.user.name, "alice");
        assert!(detail.nodes.is_empty());
        assert_eq!(detail.preauth_keys.len(), 3);
    }

    #[tokio::test]
    async fn requests_carry_the_bearer_credential() {
        use axum::http::HeaderMap;
        use axum::response::IntoResponse;

        let checked = |headers: HeaderMap| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if auth == format!("Bearer {API_KEY}") {
                Json(nodes_body()).into_response()
            } else {
                StatusCode::UNAUTHORIZED.into_response()
            }
        };

        let router = Router::new().route("/api/v1/node", get(checked));
        let base = spawn_control_api(router).await;

        let nodes = aggregator_for(&base).list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 5);
    }

    #[tokio::test]
    async fn mutation_errors_surface_unchanged() {
        let router = Router::new();
        let base = spawn_control_api(router).await;

        // Router has no routes, so every mutation 404s upstream.
        let err = aggregator_for(&base)
            .rename_node("1", "new-name")
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotFound));
    }
}
