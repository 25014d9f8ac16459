//! Local stand-in for the identity API and the location document store.
//!
//! Auth responses carry the same anti-XSSI prefix as production, and login
//! hands out `session` and `XSRF-TOKEN` cookies. Store routes require both
//! application headers.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const XSSI_PREFIX: &str = ")]}'\n";
pub const APPLICATION_ID: &str = "QrX47CA9cyuGewLdsL7o5Eb8iug6Em8ye0dnAbIr";
pub const REST_API_KEY: &str = "QuWThTdiRmTux3YaDseUSEpUKo7aBYM737yKd4gY";

#[derive(Clone, Debug)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub key: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLocation {
    pub object_id: String,
    pub unique_key: String,
    pub first_name: String,
    pub last_name: String,
    pub map_string: String,
    #[serde(rename = "mediaURL")]
    pub media_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    pub unique_key: String,
    pub first_name: String,
    pub last_name: String,
    pub map_string: String,
    #[serde(rename = "mediaURL")]
    pub media_url: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug)]
struct ActiveSession {
    account_key: String,
    xsrf_token: String,
}

#[derive(Debug, Default)]
pub struct MockState {
    accounts: Vec<Account>,
    sessions: HashMap<String, ActiveSession>,
    locations: Vec<StudentLocation>,
    clock: u64,
}

impl MockState {
    /// One known account and two locations from other users.
    pub fn seeded() -> Self {
        let mut state = Self::default();
        state.add_account(Account {
            username: "student@example.com".to_string(),
            password: "password".to_string(),
            key: "u-1001".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        });
        for (key, first, last, place, lat, lon) in [
            ("u-2001", "Grace", "Hopper", "Arlington, VA", 38.88, -77.1),
            ("u-2002", "Alan", "Turing", "Manchester", 53.48, -2.24),
        ] {
            state.insert_location(LocationInput {
                unique_key: key.to_string(),
                first_name: first.to_string(),
                last_name: last.to_string(),
                map_string: place.to_string(),
                media_url: format!("https://example.com/{key}"),
                latitude: lat,
                longitude: lon,
            });
        }
        state
    }

    pub fn add_account(&mut self, account: Account) {
        self.accounts.push(account);
    }

    pub fn locations(&self) -> &[StudentLocation] {
        &self.locations
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert_location(&mut self, input: LocationInput) -> StudentLocation {
        let updated_at = self.tick();
        let location = StudentLocation {
            object_id: Uuid::new_v4().simple().to_string(),
            unique_key: input.unique_key,
            first_name: input.first_name,
            last_name: input.last_name,
            map_string: input.map_string,
            media_url: input.media_url,
            latitude: input.latitude,
            longitude: input.longitude,
            updated_at,
        };
        self.locations.push(location.clone());
        location
    }
}

pub type Db = Arc<RwLock<MockState>>;

pub fn app() -> Router {
    app_with(MockState::seeded())
}

pub fn app_with(state: MockState) -> Router {
    let db: Db = Arc::new(RwLock::new(state));
    Router::new()
        .route("/api/session", post(create_session).delete(delete_session))
        .route("/api/users/me", get(current_user))
        .route(
            "/parse/classes/StudentLocation",
            get(list_locations).post(create_location).put(create_location),
        )
        .route("/parse/classes/StudentLocation/{id}", put(update_location))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!("mock server listening on {addr}");
    }
    axum::serve(listener, app()).await
}

fn prefixed(status: StatusCode, body: Value) -> Response {
    (status, format!("{XSSI_PREFIX}{body}")).into_response()
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

// --- identity API ---

async fn create_session(State(db): State<Db>, Json(body): Json<Value>) -> Response {
    let credentials = &body["udacity"];
    let (Some(username), Some(password)) = (
        credentials["username"].as_str(),
        credentials["password"].as_str(),
    ) else {
        return prefixed(
            StatusCode::BAD_REQUEST,
            json!({"status": 400, "error": "trails.Error 400: Missing parameter"}),
        );
    };

    let mut state = db.write().await;
    let Some(account) = state
        .accounts
        .iter()
        .find(|a| a.username == username && a.password == password)
        .cloned()
    else {
        debug!(username, "rejected login");
        return prefixed(
            StatusCode::FORBIDDEN,
            json!({"status": 403, "error": "Account not found or invalid credentials."}),
        );
    };

    let session_id = Uuid::new_v4().simple().to_string();
    let xsrf_token = Uuid::new_v4().simple().to_string();
    state.sessions.insert(
        session_id.clone(),
        ActiveSession {
            account_key: account.key.clone(),
            xsrf_token: xsrf_token.clone(),
        },
    );

    let body = json!({
        "account": {"registered": true, "key": account.key},
        "session": {"id": session_id, "expiration": "2030-01-01T00:00:00.000Z"}
    });
    (
        AppendHeaders([
            (header::SET_COOKIE, format!("session={session_id}; Path=/; HttpOnly")),
            (header::SET_COOKIE, format!("XSRF-TOKEN={xsrf_token}; Path=/")),
        ]),
        prefixed(StatusCode::OK, body),
    )
        .into_response()
}

async fn current_user(State(db): State<Db>, headers: HeaderMap) -> Response {
    let state = db.read().await;
    let account = cookie(&headers, "session")
        .and_then(|id| state.sessions.get(&id))
        .and_then(|session| state.accounts.iter().find(|a| a.key == session.account_key));
    match account {
        Some(account) => prefixed(
            StatusCode::OK,
            json!({"user": {
                "key": account.key,
                "first_name": account.first_name,
                "last_name": account.last_name,
            }}),
        ),
        None => prefixed(StatusCode::FORBIDDEN, json!({"status": 403, "error": "not signed in"})),
    }
}

async fn delete_session(State(db): State<Db>, headers: HeaderMap) -> Response {
    let mut state = db.write().await;
    let Some(session_id) = cookie(&headers, "session").filter(|id| state.sessions.contains_key(id))
    else {
        return prefixed(StatusCode::FORBIDDEN, json!({"status": 403, "error": "no session"}));
    };

    let echoed = headers
        .get("x-xsrf-token")
        .and_then(|value| value.to_str().ok());
    if let (Some(echoed), Some(session)) = (echoed, state.sessions.get(&session_id)) {
        if echoed != session.xsrf_token {
            return prefixed(StatusCode::FORBIDDEN, json!({"status": 403, "error": "xsrf mismatch"}));
        }
    }

    state.sessions.remove(&session_id);
    (
        AppendHeaders([
            (header::SET_COOKIE, "session=; Path=/; Max-Age=0".to_string()),
            (header::SET_COOKIE, "XSRF-TOKEN=; Path=/; Max-Age=0".to_string()),
        ]),
        prefixed(
            StatusCode::OK,
            json!({"session": {"id": session_id, "expiration": "2030-01-01T00:00:00.000Z"}}),
        ),
    )
        .into_response()
}

// --- document store ---

type StoreError = (StatusCode, Json<Value>);

fn require_app_headers(headers: &HeaderMap) -> Result<(), StoreError> {
    let has = |name: &str, expected: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == expected)
    };
    if has("x-parse-application-id", APPLICATION_ID) && has("x-parse-rest-api-key", REST_API_KEY) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))))
    }
}

async fn list_locations(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StoreError> {
    require_app_headers(&headers)?;

    let owner_filter = match params.get("where") {
        Some(raw) => {
            let filter: Value = serde_json::from_str(raw).map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"code": 107, "error": "invalid json for where"})),
                )
            })?;
            filter["uniqueKey"].as_str().map(str::to_string)
        }
        None => None,
    };
    let skip = params.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0usize);
    let limit = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100usize);

    let state = db.read().await;
    let mut matching: Vec<&StudentLocation> = state
        .locations
        .iter()
        .filter(|l| owner_filter.as_deref().map_or(true, |key| l.unique_key == key))
        .collect();
    match params.get("order").map(String::as_str) {
        Some("-updatedAt") => matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        Some("updatedAt") => matching.sort_by_key(|l| l.updated_at),
        _ => {}
    }
    let results: Vec<&StudentLocation> = matching.into_iter().skip(skip).take(limit).collect();
    Ok(Json(json!({ "results": results })))
}

async fn create_location(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<LocationInput>,
) -> Result<(StatusCode, Json<Value>), StoreError> {
    require_app_headers(&headers)?;
    let location = db.write().await.insert_location(input);
    Ok((
        StatusCode::CREATED,
        Json(json!({"objectId": location.object_id, "createdAt": location.updated_at})),
    ))
}

async fn update_location(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<LocationInput>,
) -> Result<Json<Value>, StoreError> {
    require_app_headers(&headers)?;
    let mut state = db.write().await;
    let updated_at = state.tick();
    let location = state
        .locations
        .iter_mut()
        .find(|l| l.object_id == id)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"code": 101, "error": "Object not found."})),
            )
        })?;
    location.unique_key = input.unique_key;
    location.first_name = input.first_name;
    location.last_name = input.last_name;
    location.map_string = input.map_string;
    location.media_url = input.media_url;
    location.latitude = input.latitude;
    location.longitude = input.longitude;
    location.updated_at = updated_at;
    Ok(Json(json!({"updatedAt": updated_at})))
}
