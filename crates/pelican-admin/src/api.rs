//! User CRUD handlers.
//!
//! Every response uses the `{"ok": ...}` envelope. Validation errors are
//! 400, missing users 404, store failures 500; details carry enough to
//! debug without echoing secrets.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pelican_core::{types::valid_username, Error, PartialUser, UserRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::AppState;

const LIST_LIMIT_CAP: usize = 200;

#[derive(Serialize)]
pub struct ApiOk<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiError {
    pub ok: bool,
    pub error: ApiErrorBody,
}

fn ok_with<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiOk { ok: true, data: Some(data) })).into_response()
}

fn ok_empty() -> Response {
    (StatusCode::OK, Json(ApiOk::<Value> { ok: true, data: None })).into_response()
}

fn api_error(status: StatusCode, code: &str, message: &str, details: Option<Value>) -> Response {
    let body = ApiError {
        ok: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.to_string(),
            details,
        },
    };
    (status, Json(body)).into_response()
}

fn store_error(err: Error, username: Option<&str>) -> Response {
    match err {
        Error::NotFound => api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "user not found",
            username.map(|u| json!({ "username": u })),
        ),
        Error::InvalidInput(message) => {
            api_error(StatusCode::BAD_REQUEST, "INVALID_INPUT", &message, None)
        }
        other => {
            error!(error = %other, "store operation failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "VAULT_ERROR",
                &other.to_string(),
                None,
            )
        }
    }
}

fn invalid_username_response(username: &str) -> Response {
    api_error(
        StatusCode::BAD_REQUEST,
        "INVALID_INPUT",
        "invalid username",
        Some(json!({ "username": username })),
    )
}

fn body_or_reject<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_JSON",
            &rejection.body_text(),
            None,
        )),
    }
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub disabled: Option<String>,
    pub limit: Option<String>,
}

fn parse_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|v| v.parse::<usize>().ok()) {
        Some(n) if n > 0 => n.min(LIST_LIMIT_CAP),
        _ => LIST_LIMIT_CAP,
    }
}

pub async fn list_users(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let filter_disabled = match query.disabled.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<bool>() {
            Ok(v) => Some(v),
            Err(_) => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    "INVALID_QUERY",
                    "invalid 'disabled' query param",
                    Some(json!({ "disabled": raw })),
                );
            }
        },
    };
    let limit = parse_limit(query.limit.as_deref());
    let needle = query.q.as_deref().unwrap_or("").trim().to_lowercase();

    let usernames = match state.store.list_usernames().await {
        Ok(usernames) => usernames,
        Err(e) => return store_error(e, None),
    };

    let mut out = Vec::new();
    for username in usernames {
        if username.is_empty() {
            continue;
        }
        if !needle.is_empty() && !username.to_lowercase().contains(&needle) {
            continue;
        }
        let record = match state.store.load_user(&username).await {
            Ok(record) => record,
            Err(Error::NotFound) => continue,
            Err(e) => return store_error(e, None),
        };
        if let Some(want) = filter_disabled {
            if record.disabled != want {
                continue;
            }
        }
        out.push(json!({
            "username": record.username,
            "disabled": record.disabled,
            "rootSubdir": record.root_subdir,
            "keyCount": record.public_keys.len(),
            "quotaBytes": record.quota_bytes,
            "quotaFiles": record.quota_files,
            "updatedAt": record.updated_at,
        }));
        if out.len() >= limit {
            break;
        }
    }

    ok_with(out)
}

pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<UserRecord>, JsonRejection>,
) -> Response {
    let mut record = match body_or_reject(body) {
        Ok(record) => record,
        Err(response) => return response,
    };
    if let Err(e) = record.normalize_and_validate(None, true) {
        return store_error(e, None);
    }
    match state.store.save_user(&record).await {
        Ok(()) => ok_empty(),
        Err(e) => store_error(e, None),
    }
}

pub async fn get_user(State(state): State<AppState>, Path(username): Path<String>) -> Response {
    if !valid_username(&username) {
        return invalid_username_response(&username);
    }
    match state.store.load_user(&username).await {
        Ok(record) => ok_with(record),
        Err(e) => store_error(e, Some(&username)),
    }
}

pub async fn put_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    body: Result<Json<UserRecord>, JsonRejection>,
) -> Response {
    let mut record = match body_or_reject(body) {
        Ok(record) => record,
        Err(response) => return response,
    };
    // The path username wins over whatever the body says.
    if let Err(e) = record.normalize_and_validate(Some(&username), true) {
        return store_error(e, None);
    }
    match state.store.save_user(&record).await {
        Ok(()) => ok_empty(),
        Err(e) => store_error(e, Some(&username)),
    }
}

pub async fn patch_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    body: Result<Json<PartialUser>, JsonRejection>,
) -> Response {
    if !valid_username(&username) {
        return invalid_username_response(&username);
    }
    let patch = match body_or_reject(body) {
        Ok(patch) => patch,
        Err(response) => return response,
    };

    let mut record = match state.store.load_user(&username).await {
        Ok(record) => record,
        Err(e) => return store_error(e, Some(&username)),
    };
    patch.apply(&mut record);
    if let Err(e) = record.normalize_and_validate(Some(&username), true) {
        return store_error(e, None);
    }
    match state.store.save_user(&record).await {
        Ok(()) => ok_empty(),
        Err(e) => store_error(e, Some(&username)),
    }
}

pub async fn delete_user(State(state): State<AppState>, Path(username): Path<String>) -> Response {
    if !valid_username(&username) {
        return invalid_username_response(&username);
    }
    match state.store.delete_user(&username).await {
        Ok(()) => ok_empty(),
        Err(e) => store_error(e, Some(&username)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pelican_core::Result;
    use pelican_vault::UserStore;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    struct MemoryStore {
        records: RwLock<HashMap<String, UserRecord>>,
    }

    #[async_trait]
    impl UserStore for MemoryStore {
        async fn load_user(&self, username: &str) -> Result<UserRecord> {
            self.records
                .read()
                .await
                .get(username)
                .cloned()
                .ok_or(Error::NotFound)
        }

        async fn save_user(&self, record: &UserRecord) -> Result<()> {
            let mut stamped = record.clone();
            stamped.updated_at = Some(chrono::Utc::now().to_rfc3339());
            self.records
                .write()
                .await
                .insert(stamped.username.clone(), stamped);
            Ok(())
        }

        async fn delete_user(&self, username: &str) -> Result<()> {
            self.records
                .write()
                .await
                .remove(username)
                .map(|_| ())
                .ok_or(Error::NotFound)
        }

        async fn list_usernames(&self) -> Result<Vec<String>> {
            let mut names: Vec<String> = self.records.read().await.keys().cloned().collect();
            names.sort();
            Ok(names)
        }
    }

    fn state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore {
                records: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn alice() -> UserRecord {
        UserRecord {
            username: "alice".into(),
            public_keys: vec!["ssh-ed25519 AAAA alice@laptop".into()],
            quota_bytes: 1024,
            ..Default::default()
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let state = state();
        let response = create_user(State(state.clone()), Ok(Json(alice()))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_user(State(state), Path("alice".into())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["data"]["username"], json!("alice"));
        // rootSubdir defaulted to the username; updatedAt was stamped.
        assert_eq!(body["data"]["rootSubdir"], json!("alice"));
        assert!(body["data"]["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_create_requires_keys() {
        let state = state();
        let mut record = alice();
        record.public_keys.clear();
        let response = create_user(State(state), Ok(Json(record))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn test_get_unknown_user_is_404() {
        let response = get_user(State(state()), Path("ghost".into())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_get_invalid_username_is_400() {
        let response = get_user(State(state()), Path("Not Valid".into())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_replaces_fully() {
        let state = state();
        create_user(State(state.clone()), Ok(Json(alice()))).await;

        let replacement = UserRecord {
            username: "ignored".into(),
            public_keys: vec!["ssh-rsa BBBB new@key".into()],
            root_subdir: "tenants/alice".into(),
            ..Default::default()
        };
        let response = put_user(State(state.clone()), Path("alice".into()), Ok(Json(replacement))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(get_user(State(state), Path("alice".into())).await).await;
        assert_eq!(body["data"]["username"], json!("alice"));
        assert_eq!(body["data"]["rootSubdir"], json!("tenants/alice"));
        assert_eq!(body["data"]["quotaBytes"], json!(0));
    }

    #[tokio::test]
    async fn test_patch_preserves_unset_fields() {
        let state = state();
        create_user(State(state.clone()), Ok(Json(alice()))).await;

        let patch = PartialUser {
            disabled: Some(true),
            ..Default::default()
        };
        let response = patch_user(State(state.clone()), Path("alice".into()), Ok(Json(patch))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(get_user(State(state), Path("alice".into())).await).await;
        assert_eq!(body["data"]["disabled"], json!(true));
        assert_eq!(body["data"]["quotaBytes"], json!(1024));
        assert_eq!(body["data"]["publicKeys"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_patch_missing_user_is_404() {
        let response = patch_user(
            State(state()),
            Path("ghost".into()),
            Ok(Json(PartialUser::default())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_404() {
        let state = state();
        create_user(State(state.clone()), Ok(Json(alice()))).await;

        let response = delete_user(State(state.clone()), Path("alice".into())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = delete_user(State(state.clone()), Path("alice".into())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get_user(State(state), Path("alice".into())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters_and_limits() {
        let state = state();
        for (name, disabled) in [("alice", false), ("albert", true), ("bob", false)] {
            let record = UserRecord {
                username: name.into(),
                disabled,
                public_keys: vec!["ssh-ed25519 AAAA".into()],
                ..Default::default()
            };
            create_user(State(state.clone()), Ok(Json(record))).await;
        }

        // Substring filter is case-insensitive on the username.
        let body = body_json(
            list_users(
                State(state.clone()),
                Query(ListQuery {
                    q: Some("AL".into()),
                    ..Default::default()
                }),
            )
            .await,
        )
        .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        // Disabled filter.
        let body = body_json(
            list_users(
                State(state.clone()),
                Query(ListQuery {
                    disabled: Some("true".into()),
                    ..Default::default()
                }),
            )
            .await,
        )
        .await;
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["username"], json!("albert"));

        // Limit.
        let body = body_json(
            list_users(
                State(state.clone()),
                Query(ListQuery {
                    limit: Some("1".into()),
                    ..Default::default()
                }),
            )
            .await,
        )
        .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        // Bad disabled value is a 400.
        let response = list_users(
            State(state),
            Query(ListQuery {
                disabled: Some("maybe".into()),
                ..Default::default()
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_limit_caps_and_defaults() {
        assert_eq!(parse_limit(None), 200);
        assert_eq!(parse_limit(Some("50")), 50);
        assert_eq!(parse_limit(Some("5000")), 200);
        assert_eq!(parse_limit(Some("0")), 200);
        assert_eq!(parse_limit(Some("junk")), 200);
    }
}
