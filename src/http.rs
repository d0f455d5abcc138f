//! Viewer-facing boundary: HTML views (login, dashboard), the JSON API the
//! dashboard script calls, and the WebSocket push channel. Timestamp
//! formatting lives here, not in the aggregator: the API gets ISO-8601, the
//! HTML gets human strings with "Never"/"Unknown" fallbacks.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::cache::SnapshotCache;
use crate::models::{Node, PreauthKey, User, UserDetail};
use crate::relay::{PushMessage, PushRelay};
use crate::session::{token_from_headers, Identity, SessionStore, SESSION_COOKIE};
use crate::upstream::UpstreamError;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub cache: Arc<SnapshotCache>,
    pub relay: PushRelay,
    pub sessions: Arc<SessionStore>,
    pub identity: Arc<Identity>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/ws", get(ws_upgrade))
        .route("/api/stats", get(api_stats))
        .route("/api/nodes", get(api_nodes))
        .route("/api/nodes/:id", get(api_node).delete(api_delete_node))
        .route("/api/nodes/:id/rename", post(api_rename_node))
        .route("/api/nodes/:id/tags", post(api_set_node_tags))
        .route("/api/nodes/:id/expire", post(api_expire_node))
        .route("/api/users", get(api_users).post(api_create_user))
        .route(
            "/api/users/:id",
            get(api_user).put(api_rename_user).delete(api_delete_user),
        )
        .route("/api/users/:id/preauthkey", post(api_create_preauth_key))
        .route("/api/status", get(api_status))
        .route("/api/metrics", get(api_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---- auth plumbing ----------------------------------------------------

fn authed(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let token = token_from_headers(headers)?;
    state.sessions.validate(&token)
}

/// Upstream failures mapped to viewer-facing responses. The viewer's
/// credential is never the problem on an upstream 401, so everything but
/// NotFound is a gateway error.
struct ApiError(UpstreamError);

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            UpstreamError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

// ---- timestamp adapters ------------------------------------------------

/// ISO-8601 for the machine-readable API. Null stays null.
pub fn iso(t: &Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Human string for HTML views. Null becomes the caller's fallback.
pub fn human(t: &Option<DateTime<Utc>>, fallback: &str) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| fallback.to_string())
}

// ---- API view shapes ----------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeView {
    id: String,
    name: String,
    given_name: Option<String>,
    online: bool,
    last_seen: Option<String>,
    created_at: Option<String>,
    expiry: Option<String>,
    ip_addresses: Vec<String>,
    tags: Vec<String>,
    user: Option<String>,
}

impl NodeView {
    fn from(n: &Node) -> Self {
        Self {
            id: n.id.clone(),
            name: n.name.clone(),
            given_name: n.given_name.clone(),
            online: n.online,
            last_seen: iso(&n.last_seen),
            created_at: iso(&n.created_at),
            expiry: iso(&n.expiry),
            ip_addresses: n.ip_addresses.clone(),
            tags: n.tags.clone(),
            user: n.user.as_ref().map(|u| u.name.clone()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    id: String,
    name: String,
    created_at: Option<String>,
}

impl UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            created_at: iso(&u.created_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreauthKeyView {
    id: String,
    key: String,
    user: String,
    reusable: bool,
    used: bool,
    expiration: Option<String>,
    created_at: Option<String>,
    tags: Vec<String>,
}

impl PreauthKeyView {
    fn from(k: &PreauthKey) -> Self {
        Self {
            id: k.id.clone(),
            key: k.key.clone(),
            user: k.user.clone(),
            reusable: k.reusable,
            used: k.used,
            expiration: iso(&k.expiration),
            created_at: iso(&k.created_at),
            tags: k.tags.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDetailView {
    user: UserView,
    nodes: Vec<NodeView>,
    preauth_keys: Vec<PreauthKeyView>,
}

impl UserDetailView {
    fn from(d: &UserDetail) -> Self {
        Self {
            user: UserView::from(&d.user),
            nodes: d.nodes.iter().map(NodeView::from).collect(),
            preauth_keys: d.preauth_keys.iter().map(PreauthKeyView::from).collect(),
        }
    }
}

// ---- JSON API ------------------------------------------------------------

async fn api_stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }

    let ticket = state.cache.begin();
    let snapshot = state.aggregator.fetch_snapshot().await;
    state.cache.store(ticket, snapshot);
    // Serve whatever the cache settled on, which may be a newer refresh.
    let current = state.cache.get().unwrap_or(snapshot);
    Json(current).into_response()
}

async fn api_nodes(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.list_nodes().await {
        Ok(nodes) => Json(nodes.iter().map(NodeView::from).collect::<Vec<_>>()).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.get_node(&id).await {
        Ok(node) => Json(NodeView::from(&node)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.list_users().await {
        Ok(users) => Json(users.iter().map(UserView::from).collect::<Vec<_>>()).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.fetch_user_detail(&id).await {
        Ok(detail) => Json(UserDetailView::from(&detail)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Deserialize)]
struct MetricsQuery {
    query: Option<String>,
}

async fn api_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<MetricsQuery>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    let Some(query) = params.query else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Query parameter is required" })),
        )
            .into_response();
    };
    match state.aggregator.query_metrics(&query).await {
        // Unconfigured metrics service degrades to null, not an error.
        Ok(result) => Json(result.unwrap_or(serde_json::Value::Null)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Deserialize)]
struct RenameBody {
    name: String,
}

async fn api_rename_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.rename_node(&id, &body.name).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Deserialize)]
struct TagsBody {
    tags: Vec<String>,
}

async fn api_set_node_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TagsBody>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    let tags: Vec<String> = body.tags.iter().map(|t| t.trim().to_string()).collect();
    match state.aggregator.set_node_tags(&id, &tags).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_expire_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.expire_node(&id).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_delete_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.delete_node(&id).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Deserialize)]
struct CreateUserBody {
    name: String,
}

async fn api_create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateUserBody>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    if body.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "User name is required" })),
        )
            .into_response();
    }
    match state.aggregator.create_user(&body.name).await {
        Ok(v) => (StatusCode::CREATED, Json(v)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_rename_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    if body.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "User name is required" })),
        )
            .into_response();
    }
    match state.aggregator.rename_user(&id, &body.name).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn api_delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    match state.aggregator.delete_user(&id).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Deserialize)]
struct CreatePreauthKeyBody {
    expiration: Option<String>,
    reusable: Option<bool>,
    tags: Option<Vec<String>>,
}

async fn api_create_preauth_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CreatePreauthKeyBody>,
) -> Response {
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    let expiration = body.expiration.unwrap_or_else(|| "24h".to_string());
    let tags = body.tags.unwrap_or_default();
    match state
        .aggregator
        .create_preauth_key(&id, &expiration, body.reusable.unwrap_or(false), &tags)
        .await
    {
        Ok(v) => (StatusCode::CREATED, Json(v)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

// ---- push channel ---------------------------------------------------------

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    // The push channel carries the same data as the console pages, so the
    // upgrade requires the same session.
    if authed(&state, &headers).is_none() {
        return unauthorized();
    }
    let rx = state.relay.subscribe();
    ws.on_upgrade(move |socket| viewer_loop(socket, rx))
}

/// Forwards relay broadcasts to one viewer until either side goes away.
/// Delivery is at-most-once: a viewer that lags past the channel capacity
/// simply misses those messages.
async fn viewer_loop(socket: WebSocket, mut rx: broadcast::Receiver<PushMessage>) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(msg) => {
                    let Ok(text) = serde_json::to_string(&msg) else { continue };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break; // viewer gone mid-broadcast; nobody else cares
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "viewer lagged, dropping missed updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {} // viewers have nothing to tell us
            },
        }
    }
}

// ---- HTML views -------------------------------------------------------------

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn login_page() -> Html<String> {
    Html(LOGIN_HTML.to_string())
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    if state.identity.verify(&form.username, &form.password) {
        let token = state.sessions.create(&form.username);
        return Response::builder()
            .status(StatusCode::SEE_OTHER)
            .header(header::LOCATION, "/")
            .header(
                header::SET_COOKIE,
                format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict"),
            )
            .body(Body::empty())
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    Html(LOGIN_HTML.replace(
        "<!-- ERROR -->",
        r#"<div class="error">Invalid username or password</div>"#,
    ))
    .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = token_from_headers(&headers) {
        state.sessions.remove(&token);
    }
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, "/login")
        .header(
            header::SET_COOKIE,
            format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"),
        )
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn dashboard_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(username) = authed(&state, &headers) else {
        return Redirect::to("/login").into_response();
    };

    // On-demand refresh through the same ticket protocol as the relay loop,
    // so an overlapping timer refresh can never be clobbered by this one.
    let ticket = state.cache.begin();
    let snapshot = state.aggregator.fetch_snapshot().await;
    state.cache.store(ticket, snapshot);
    let stats = state.cache.get().unwrap_or(snapshot);

    // Entity tables degrade to empty on upstream failure; the stat cards
    // already tell the "upstream is down" story as zeros.
    let nodes = state.aggregator.list_nodes().await.unwrap_or_default();
    let users = state.aggregator.list_users().await.unwrap_or_default();

    let nodes_html: String = nodes
        .iter()
        .map(|n| {
            let badge = if n.online {
                r#"<span class="badge online">online</span>"#
            } else {
                r#"<span class="badge offline">offline</span>"#
            };
            format!(
                r#"<tr data-node-id="{}">
                    <td>{}</td>
                    <td>{}</td>
                    <td class="mono">{}</td>
                    <td>{}</td>
                    <td class="node-status">{}</td>
                    <td>{}</td>
                    <td>{}</td>
                </tr>"#,
                escape(&n.id),
                escape(&n.name),
                escape(n.user.as_ref().map(|u| u.name.as_str()).unwrap_or("-")),
                escape(&n.ip_addresses.join(", ")),
                escape(&n.tags.join(", ")),
                badge,
                human(&n.last_seen, "Never"),
                human(&n.created_at, "Unknown"),
            )
        })
        .collect();

    let users_html: String = users
        .iter()
        .map(|u| {
            format!(
                r#"<tr>
                    <td>{}</td>
                    <td class="mono">{}</td>
                    <td>{}</td>
                </tr>"#,
                escape(&u.name),
                escape(&u.id),
                human(&u.created_at, "Unknown"),
            )
        })
        .collect();

    let html = DASHBOARD_HTML
        .replace("{{USERNAME}}", &escape(&username))
        .replace("{{TOTAL_NODES}}", &stats.total_nodes.to_string())
        .replace("{{ONLINE_NODES}}", &stats.online_nodes.to_string())
        .replace("{{TOTAL_USERS}}", &stats.total_users.to_string())
        .replace("{{TOTAL_KEYS}}", &stats.total_preauth_keys.to_string())
        .replace("{{NODES_TABLE}}", &nodes_html)
        .replace("{{USERS_TABLE}}", &users_html);

    Html(html).into_response()
}

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Meshboard - Login</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
        }
        .login-container {
            background: rgba(255,255,255,0.1);
            backdrop-filter: blur(10px);
            padding: 40px;
            border-radius: 16px;
            box-shadow: 0 8px 32px rgba(0,0,0,0.3);
            width: 100%;
            max-width: 400px;
        }
        .logo { text-align: center; margin-bottom: 30px; color: #fff; }
        .logo h1 { font-size: 28px; margin-bottom: 5px; }
        .logo p { color: #888; font-size: 14px; }
        .form-group { margin-bottom: 20px; }
        label { display: block; color: #ccc; margin-bottom: 8px; font-size: 14px; }
        input[type="text"], input[type="password"] {
            width: 100%;
            padding: 12px 16px;
            border: 1px solid rgba(255,255,255,0.2);
            border-radius: 8px;
            background: rgba(255,255,255,0.1);
            color: #fff;
            font-size: 16px;
        }
        input:focus { outline: none; border-color: #4facfe; }
        button {
            width: 100%;
            padding: 14px;
            background: linear-gradient(135deg, #4facfe 0%, #00f2fe 100%);
            border: none;
            border-radius: 8px;
            color: #fff;
            font-size: 16px;
            font-weight: 600;
            cursor: pointer;
        }
        button:hover { transform: translateY(-2px); }
        .error {
            background: rgba(255,82,82,0.2);
            border: 1px solid #ff5252;
            color: #ff5252;
            padding: 12px;
            border-radius: 8px;
            margin-bottom: 20px;
            text-align: center;
        }
    </style>
</head>
<body>
    <div class="login-container">
        <div class="logo">
            <h1>&#x1F578; Meshboard</h1>
            <p>Mesh Network Admin Console</p>
        </div>
        <!-- ERROR -->
        <form method="POST" action="/login">
            <div class="form-group">
                <label for="username">Username</label>
                <input type="text" id="username" name="username" required autocomplete="username">
            </div>
            <div class="form-group">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" required autocomplete="current-password">
            </div>
            <button type="submit">Sign In</button>
        </form>
    </div>
</body>
</html>"#;

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Meshboard</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #0f0f1a;
            color: #fff;
            min-height: 100vh;
        }
        .header {
            background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);
            padding: 20px 30px;
            display: flex;
            justify-content: space-between;
            align-items: center;
            border-bottom: 1px solid rgba(255,255,255,0.1);
        }
        .logo { display: flex; align-items: center; gap: 15px; }
        .logo h1 { font-size: 24px; }
        .logo span { color: #4facfe; }
        .user-info { display: flex; align-items: center; gap: 20px; }
        .user-info a { color: #888; text-decoration: none; padding: 8px 16px; border-radius: 6px; }
        .user-info a:hover { background: rgba(255,255,255,0.1); color: #fff; }
        .user-info .logout { color: #ff5252; }
        .container { padding: 30px; max-width: 1600px; margin: 0 auto; }
        .stats-grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
            gap: 20px;
            margin-bottom: 30px;
        }
        .stat-card {
            background: linear-gradient(135deg, rgba(255,255,255,0.1) 0%, rgba(255,255,255,0.05) 100%);
            padding: 25px;
            border-radius: 12px;
            border: 1px solid rgba(255,255,255,0.1);
        }
        .stat-card h3 {
            color: #888;
            font-size: 12px;
            text-transform: uppercase;
            letter-spacing: 1px;
            margin-bottom: 10px;
        }
        .stat-card .value {
            font-size: 32px;
            font-weight: 700;
            background: linear-gradient(135deg, #4facfe 0%, #00f2fe 100%);
            -webkit-background-clip: text;
            -webkit-text-fill-color: transparent;
            background-clip: text;
        }
        .stat-card.online .value { background: linear-gradient(135deg, #4caf50 0%, #8bc34a 100%); -webkit-background-clip: text; background-clip: text; }
        .section {
            background: rgba(255,255,255,0.05);
            border-radius: 12px;
            border: 1px solid rgba(255,255,255,0.1);
            overflow: hidden;
            margin-bottom: 30px;
        }
        .section-header {
            padding: 20px;
            border-bottom: 1px solid rgba(255,255,255,0.1);
            display: flex;
            justify-content: space-between;
            align-items: center;
        }
        .section-header h2 { font-size: 18px; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 14px 16px; text-align: left; border-bottom: 1px solid rgba(255,255,255,0.05); }
        th {
            background: rgba(0,0,0,0.2);
            font-size: 12px;
            text-transform: uppercase;
            letter-spacing: 1px;
            color: #888;
        }
        tr:hover { background: rgba(255,255,255,0.03); }
        .mono { font-family: 'Monaco', 'Menlo', monospace; font-size: 13px; }
        .badge {
            display: inline-block;
            padding: 4px 10px;
            border-radius: 4px;
            font-size: 12px;
            font-weight: 600;
        }
        .badge.online { background: rgba(76,175,80,0.2); color: #4caf50; }
        .badge.offline { background: rgba(244,67,54,0.2); color: #f44336; }
        #activity-list { list-style: none; }
        #activity-list li { padding: 12px 20px; border-bottom: 1px solid rgba(255,255,255,0.05); color: #ccc; }
        #activity-list li span { color: #888; font-size: 13px; }
        .empty-state { padding: 40px 20px; text-align: center; color: #666; }
        @keyframes pulse { 0%, 100% { opacity: 1; } 50% { opacity: 0.5; } }
        .live-indicator {
            display: inline-block;
            width: 8px;
            height: 8px;
            background: #4caf50;
            border-radius: 50%;
            margin-right: 8px;
            animation: pulse 2s infinite;
        }
    </style>
</head>
<body>
    <div class="header">
        <div class="logo">
            <h1>&#x1F578; Meshboard</h1>
            <span>Mesh Network Admin Console</span>
        </div>
        <div class="user-info">
            <span>&#x1F464; {{USERNAME}}</span>
            <a href="/logout" class="logout">Logout</a>
        </div>
    </div>

    <div class="container">
        <div class="stats-grid">
            <div class="stat-card">
                <h3>Total Nodes</h3>
                <div class="value" id="total-nodes">{{TOTAL_NODES}}</div>
            </div>
            <div class="stat-card online">
                <h3>Online Nodes</h3>
                <div class="value" id="online-nodes">{{ONLINE_NODES}}</div>
            </div>
            <div class="stat-card">
                <h3>Users</h3>
                <div class="value" id="total-users">{{TOTAL_USERS}}</div>
            </div>
            <div class="stat-card">
                <h3>Pre-auth Keys</h3>
                <div class="value" id="total-keys">{{TOTAL_KEYS}}</div>
            </div>
        </div>

        <div class="section">
            <div class="section-header">
                <h2><span class="live-indicator"></span>Nodes</h2>
            </div>
            <table>
                <thead>
                    <tr>
                        <th>Name</th>
                        <th>User</th>
                        <th>Addresses</th>
                        <th>Tags</th>
                        <th>Status</th>
                        <th>Last Seen</th>
                        <th>Created</th>
                    </tr>
                </thead>
                <tbody id="nodes-table">
                    {{NODES_TABLE}}
                </tbody>
            </table>
        </div>

        <div class="section">
            <div class="section-header">
                <h2>Users</h2>
            </div>
            <table>
                <thead>
                    <tr>
                        <th>Name</th>
                        <th>ID</th>
                        <th>Created</th>
                    </tr>
                </thead>
                <tbody id="users-table">
                    {{USERS_TABLE}}
                </tbody>
            </table>
        </div>

        <div class="section">
            <div class="section-header">
                <h2>Activity</h2>
            </div>
            <ul id="activity-list"></ul>
            <div class="empty-state" id="activity-empty">No activity yet.</div>
        </div>
    </div>

    <script>
        const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
        const socket = new WebSocket(proto + '//' + location.host + '/ws');

        socket.onmessage = (event) => {
            const msg = JSON.parse(event.data);
            switch (msg.type) {
                case 'stats_update':
                    document.getElementById('total-nodes').textContent = msg.totalNodes;
                    document.getElementById('online-nodes').textContent = msg.onlineNodes;
                    document.getElementById('total-users').textContent = msg.totalUsers;
                    document.getElementById('total-keys').textContent = msg.totalPreauthKeys;
                    break;
                case 'node_status_change': {
                    const row = document.querySelector(`tr[data-node-id="${msg.id}"]`);
                    if (row) {
                        const cell = row.querySelector('.node-status');
                        cell.innerHTML = msg.online
                            ? '<span class="badge online">online</span>'
                            : '<span class="badge offline">offline</span>';
                    }
                    break;
                }
                case 'user_activity': {
                    const list = document.getElementById('activity-list');
                    document.getElementById('activity-empty').style.display = 'none';
                    const item = document.createElement('li');
                    item.textContent = msg.title + ' — ';
                    const detail = document.createElement('span');
                    detail.textContent = msg.description;
                    item.appendChild(detail);
                    list.prepend(item);
                    while (list.children.length > 20) list.removeChild(list.lastChild);
                    break;
                }
            }
        };
    </script>
</body>
</html>"##;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn null_timestamps_format_without_panicking() {
        let none: Option<DateTime<Utc>> = None;
        assert!(iso(&none).is_none());
        assert_eq!(human(&none, "Never"), "Never");
        // Idempotent: formatting null twice is still null.
        assert!(iso(&none).is_none());
    }

    #[test]
    fn timestamps_format_both_ways() {
        let t = Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap());
        assert_eq!(iso(&t).unwrap(), "2025-03-01T12:30:00Z");
        assert_eq!(human(&t, "Never"), "2025-03-01 12:30:00");
    }

    #[test]
    fn escape_neutralizes_markup() {
        assert_eq!(
            escape(r#"<script>"x"&y</script>"#),
            "&lt;script&gt;&quot;x&quot;&amp;y&lt;/script&gt;"
        );
        assert_eq!(escape("laptop-1"), "laptop-1");
    }

    #[test]
    fn node_view_carries_iso_strings() {
        let node = Node {
            id: "7".into(),
            name: "laptop".into(),
            given_name: None,
            online: true,
            last_seen: None,
            created_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()),
            expiry: None,
            ip_addresses: vec!["100.64.0.7".into()],
            tags: vec![],
            user: Some(User {
                id: "1".into(),
                name: "alice".into(),
                created_at: None,
            }),
        };
        let view = NodeView::from(&node);
        assert!(view.last_seen.is_none());
        assert_eq!(view.created_at.as_deref(), Some("2025-03-01T00:00:00Z"));
        assert_eq!(view.user.as_deref(), Some("alice"));
    }
}
