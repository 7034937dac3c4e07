//! In-memory stand-in for the Grafana HTTP API
//!
//! Covers the data source and access-control role endpoints the provider
//! calls, including the rules Grafana enforces on them: unique data source
//! names, secure values never returned, and role updates only on version
//! increase.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

#[derive(Default)]
struct Store {
    next_id: i64,
    data_sources: BTreeMap<i64, StoredDataSource>,
    roles: BTreeMap<String, Value>,
}

struct StoredDataSource {
    body: Map<String, Value>,
    secure_fields: Map<String, Value>,
}

impl StoredDataSource {
    fn to_json(&self) -> Value {
        let mut body = self.body.clone();
        body.insert("secureJsonFields".to_string(), Value::Object(self.secure_fields.clone()));
        Value::Object(body)
    }
}

type Shared = Arc<Mutex<Store>>;

fn error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    error(StatusCode::NOT_FOUND, &format!("{} not found", what))
}

fn short_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..14].to_string()
}

fn str_field<'a>(body: &'a Map<String, Value>, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Running emulator bound to a random local port
pub struct FakeGrafana {
    pub url: String,
    store: Shared,
}

impl FakeGrafana {
    pub async fn start() -> Self {
        let store = Shared::default();
        let app = Router::new()
            .route("/api/datasources", post(create_data_source))
            .route(
                "/api/datasources/:id",
                get(get_data_source).put(update_data_source).delete(delete_data_source),
            )
            .route("/api/datasources/uid/:uid", get(get_data_source_by_uid))
            .route("/api/datasources/name/:name", get(get_data_source_by_name))
            .route("/api/access-control/roles", post(create_role))
            .route(
                "/api/access-control/roles/:uid",
                get(get_role).put(update_role).delete(delete_role),
            )
            .with_state(store.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            store,
        }
    }

    /// Secure values Grafana holds for a data source
    pub fn secure_fields(&self, id: i64) -> Vec<String> {
        let store = self.store.lock().unwrap();
        let mut fields: Vec<String> = store
            .data_sources
            .get(&id)
            .map(|ds| ds.secure_fields.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }
}

fn parse_id(raw: &str) -> Result<i64, (StatusCode, Json<Value>)> {
    raw.parse::<i64>().map_err(|_| error(StatusCode::BAD_REQUEST, "id is invalid"))
}

fn split_secure(body: &mut Map<String, Value>) -> Map<String, Value> {
    match body.remove("secureJsonData") {
        Some(Value::Object(secure)) => secure.keys().map(|k| (k.clone(), Value::Bool(true))).collect(),
        _ => Map::new(),
    }
}

async fn create_data_source(State(store): State<Shared>, Json(mut body): Json<Map<String, Value>>) -> ApiResult {
    let mut store = store.lock().unwrap();
    let name = str_field(&body, "name").to_string();
    if store.data_sources.values().any(|ds| str_field(&ds.body, "name") == name) {
        return Err(error(StatusCode::CONFLICT, "data source with the same name already exists"));
    }

    store.next_id += 1;
    let id = store.next_id;
    let secure_fields = split_secure(&mut body);
    body.insert("id".to_string(), json!(id));
    if str_field(&body, "uid").is_empty() {
        body.insert("uid".to_string(), json!(short_uid()));
    }
    body.entry("jsonData").or_insert_with(|| json!({}));

    let stored = StoredDataSource { body, secure_fields };
    let response = json!({
        "id": id,
        "message": "Datasource added",
        "name": name,
        "datasource": stored.to_json(),
    });
    store.data_sources.insert(id, stored);
    Ok(Json(response))
}

async fn get_data_source(State(store): State<Shared>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let store = store.lock().unwrap();
    store
        .data_sources
        .get(&id)
        .map(|ds| Json(ds.to_json()))
        .ok_or_else(|| not_found("Data source"))
}

async fn get_data_source_by_uid(State(store): State<Shared>, Path(uid): Path<String>) -> ApiResult {
    let store = store.lock().unwrap();
    store
        .data_sources
        .values()
        .find(|ds| str_field(&ds.body, "uid") == uid)
        .map(|ds| Json(ds.to_json()))
        .ok_or_else(|| not_found("Data source"))
}

async fn get_data_source_by_name(State(store): State<Shared>, Path(name): Path<String>) -> ApiResult {
    let store = store.lock().unwrap();
    store
        .data_sources
        .values()
        .find(|ds| str_field(&ds.body, "name") == name)
        .map(|ds| Json(ds.to_json()))
        .ok_or_else(|| not_found("Data source"))
}

async fn update_data_source(
    State(store): State<Shared>,
    Path(id): Path<String>,
    Json(mut body): Json<Map<String, Value>>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let mut store = store.lock().unwrap();
    let existing = store.data_sources.get_mut(&id).ok_or_else(|| not_found("Data source"))?;

    let mut secure_fields = split_secure(&mut body);
    for key in existing.secure_fields.keys() {
        secure_fields.entry(key.clone()).or_insert(Value::Bool(true));
    }
    if str_field(&body, "uid").is_empty() {
        body.insert("uid".to_string(), json!(str_field(&existing.body, "uid")));
    }
    body.insert("id".to_string(), json!(id));
    body.entry("jsonData").or_insert_with(|| json!({}));

    *existing = StoredDataSource { body, secure_fields };
    Ok(Json(json!({ "id": id, "message": "Datasource updated" })))
}

async fn delete_data_source(State(store): State<Shared>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let mut store = store.lock().unwrap();
    store
        .data_sources
        .remove(&id)
        .map(|_| Json(json!({ "message": "Data source deleted" })))
        .ok_or_else(|| not_found("Data source"))
}

fn role_response(mut role: Map<String, Value>) -> Value {
    let global = role.get("global").and_then(Value::as_bool).unwrap_or(false);
    role.insert("orgId".to_string(), json!(if global { 0 } else { 1 }));
    role.entry("permissions").or_insert_with(|| json!([]));
    Value::Object(role)
}

async fn create_role(State(store): State<Shared>, Json(mut body): Json<Map<String, Value>>) -> ApiResult {
    let mut store = store.lock().unwrap();
    if str_field(&body, "uid").is_empty() {
        body.insert("uid".to_string(), json!(short_uid()));
    }
    let uid = str_field(&body, "uid").to_string();
    if store.roles.contains_key(&uid) {
        return Err(error(StatusCode::CONFLICT, "role with the same uid already exists"));
    }

    let role = role_response(body);
    store.roles.insert(uid, role.clone());
    Ok(Json(role))
}

async fn get_role(State(store): State<Shared>, Path(uid): Path<String>) -> ApiResult {
    let store = store.lock().unwrap();
    store
        .roles
        .get(&uid)
        .map(|role| Json(role.clone()))
        .ok_or_else(|| not_found("Role"))
}

async fn update_role(
    State(store): State<Shared>,
    Path(uid): Path<String>,
    Json(mut body): Json<Map<String, Value>>,
) -> ApiResult {
    let mut store = store.lock().unwrap();
    let existing = store.roles.get_mut(&uid).ok_or_else(|| not_found("Role"))?;

    let stored_version = existing.get("version").and_then(Value::as_i64).unwrap_or(0);
    let new_version = body.get("version").and_then(Value::as_i64).unwrap_or(0);
    if new_version <= stored_version {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "the provided role version is not greater than the stored one",
        ));
    }

    body.insert("uid".to_string(), json!(uid));
    *existing = role_response(body);
    Ok(Json(existing.clone()))
}

#[derive(Deserialize)]
struct DeleteRoleQuery {
    #[serde(default)]
    global: bool,
}

async fn delete_role(
    State(store): State<Shared>,
    Path(uid): Path<String>,
    Query(query): Query<DeleteRoleQuery>,
) -> ApiResult {
    let mut store = store.lock().unwrap();
    let global = store
        .roles
        .get(&uid)
        .ok_or_else(|| not_found("Role"))?
        .get("global")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if global != query.global {
        return Err(not_found("Role"));
    }

    store.roles.remove(&uid);
    Ok(Json(json!({ "message": "Role deleted" })))
}
