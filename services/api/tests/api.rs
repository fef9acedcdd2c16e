//! End-to-end tests of the HTTP surface, driven through the router with
//! in-memory storage and an in-memory account service.

use api_lib::adapters::credentials::{check_token_shape, classify_reset, ResetRow};
use api_lib::config::Config;
use api_lib::web::{router, state::AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use raven_core::{
    domain::{AuthSession, Poem, ResetTicket, User},
    feedback::HeuristicFeedback,
    journal::Journal,
    memory::{MemoryLocalStore, MemoryPoemRepository},
    ports::{AuthService, PoemRepository, PortError, PortResult, ResetLinkError},
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

//=========================================================================================
// In-memory account service
//=========================================================================================

#[derive(Default)]
struct MemoryAuth {
    users: Mutex<HashMap<String, (User, String)>>,
    sessions: Mutex<HashMap<String, Uuid>>,
    resets: Mutex<HashMap<String, ResetRow>>,
    last_token: Mutex<Option<String>>,
}

impl MemoryAuth {
    fn register(&self, email: &str, password: &str) -> User {
        let user = User {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
        };
        self.users
            .lock()
            .unwrap()
            .insert(email.to_string(), (user.clone(), password.to_string()));
        user
    }

    fn last_token(&self) -> String {
        self.last_token.lock().unwrap().clone().unwrap()
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<User> {
        if self.users.lock().unwrap().contains_key(email) {
            return Err(PortError::Conflict("Email already registered".to_string()));
        }
        Ok(self.register(email, password))
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<(User, AuthSession)> {
        let users = self.users.lock().unwrap();
        let (user, stored) = users.get(email).ok_or(PortError::Unauthorized)?;
        if stored != password {
            return Err(PortError::Unauthorized);
        }
        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id: user.user_id,
            expires_at: Utc::now() + Duration::days(1),
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), user.user_id);
        Ok((user.clone(), session))
    }

    async fn sign_out(&self, session_id: &str) -> PortResult<()> {
        self.sessions.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> PortResult<User> {
        let user_id = *self
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .ok_or(PortError::Unauthorized)?;
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|(u, _)| u.user_id == user_id)
            .map(|(u, _)| u.clone())
            .ok_or(PortError::Unauthorized)
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<Option<ResetTicket>> {
        let Some((user, _)) = self.users.lock().unwrap().get(email).cloned() else {
            return Ok(None);
        };
        let token = "a".repeat(43);
        let ticket = ResetTicket {
            token: token.clone(),
            user_id: user.user_id,
            expires_at: Utc::now() + Duration::minutes(60),
        };
        self.resets.lock().unwrap().insert(
            token.clone(),
            ResetRow {
                user_id: user.user_id,
                expires_at: ticket.expires_at,
                used: false,
            },
        );
        *self.last_token.lock().unwrap() = Some(token);
        Ok(Some(ticket))
    }

    async fn verify_reset_token(&self, token: &str) -> PortResult<Result<Uuid, ResetLinkError>> {
        if let Err(kind) = check_token_shape(token) {
            return Ok(Err(kind));
        }
        Ok(classify_reset(self.resets.lock().unwrap().get(token), Utc::now()))
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> PortResult<Result<(), ResetLinkError>> {
        if let Err(kind) = check_token_shape(token) {
            return Ok(Err(kind));
        }
        let mut resets = self.resets.lock().unwrap();
        let user_id = match classify_reset(resets.get(token), Utc::now()) {
            Ok(user_id) => user_id,
            Err(kind) => return Ok(Err(kind)),
        };
        if let Some(row) = resets.get_mut(token) {
            row.used = true;
        }
        for (user, password) in self.users.lock().unwrap().values_mut() {
            if user.user_id == user_id {
                *password = new_password.to_string();
            }
        }
        self.sessions.lock().unwrap().retain(|_, uid| *uid != user_id);
        Ok(Ok(()))
    }
}

//=========================================================================================
// Harness
//=========================================================================================

struct TestApp {
    app: Router,
    auth: Arc<MemoryAuth>,
    cloud: Arc<MemoryPoemRepository>,
    state: Arc<AppState>,
}

fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        _ => None,
    })
    .unwrap()
}

fn test_app() -> TestApp {
    let config = Arc::new(test_config());
    let auth = Arc::new(MemoryAuth::default());
    let cloud = Arc::new(MemoryPoemRepository::new());
    let journal = Journal::open(
        Arc::new(MemoryLocalStore::new()),
        cloud.clone(),
        config.utc_offset,
    )
    .unwrap();
    let state = Arc::new(AppState {
        config,
        auth: auth.clone(),
        cloud: cloud.clone(),
        feedback: Arc::new(HeuristicFeedback::seeded(7)),
        journal: Arc::new(tokio::sync::Mutex::new(journal)),
    });
    TestApp {
        app: router(state.clone()),
        auth,
        cloud,
        state,
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, cookie, body)
    }

    async fn send_json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(req).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }
}

fn poem_body(title: &str) -> Value {
    json!({
        "title": title,
        "content": "The river hums like a heart\nbeneath the stars",
        "theme": "nature",
    })
}

//=========================================================================================
// Journal routes
//=========================================================================================

#[tokio::test]
async fn anonymous_poem_is_saved_and_starts_a_streak() {
    let t = test_app();

    let (status, body) = t.send_json(post_json("/poems", poem_body("Dusk"), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["poem"]["title"], "Dusk");
    assert_eq!(body["streak"]["current"], 1);
    assert_eq!(body["streak"]["longest"], 1);
    let first = &body["streak"]["badges"][0];
    assert_eq!(first["id"], "first-poem");
    assert_eq!(first["earned"], true);

    let (status, poems) = t.send_json(get("/poems", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poems.as_array().unwrap().len(), 1);

    // Nothing is mirrored without a session.
    t.state.journal.lock().await.settle().await;
    let user = Uuid::new_v4();
    assert!(t.cloud.list_poems_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn second_poem_same_day_keeps_streak_at_one() {
    let t = test_app();
    t.send(post_json("/poems", poem_body("One"), None)).await;
    let (_, body) = t.send_json(post_json("/poems", poem_body("Two"), None)).await;
    assert_eq!(body["streak"]["current"], 1);

    let (_, poems) = t.send_json(get("/poems", None)).await;
    assert_eq!(poems[0]["title"], "Two");
    assert_eq!(poems[1]["title"], "One");
}

#[tokio::test]
async fn blank_poem_is_rejected() {
    let t = test_app();
    let (status, _, _) = t
        .send(post_json(
            "/poems",
            json!({"title": "  ", "content": "words", "theme": "love"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, streak) = t.send_json(get("/streak", None)).await;
    assert_eq!(streak["current"], 0);
}

#[tokio::test]
async fn poems_can_be_searched_and_filtered() {
    let t = test_app();
    t.send(post_json("/poems", poem_body("River Song"), None)).await;
    t.send(post_json(
        "/poems",
        json!({"title": "Empty Room", "content": "silence", "theme": "loss"}),
        None,
    ))
    .await;

    let (_, found) = t.send_json(get("/poems?q=river", None)).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["title"], "River Song");

    let (_, found) = t.send_json(get("/poems?theme=loss", None)).await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let (_, found) = t.send_json(get("/poems?theme=all", None)).await;
    assert_eq!(found.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn feedback_is_attached_to_a_saved_poem() {
    let t = test_app();
    let (_, created) = t.send_json(post_json("/poems", poem_body("Stars"), None)).await;
    let id = created["poem"]["id"].as_str().unwrap().to_string();

    let (status, poem) = t
        .send_json(post_json(&format!("/poems/{id}/feedback"), json!({}), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    let score = poem["feedback"]["score"].as_u64().unwrap();
    assert!((3..=10).contains(&score));
    assert!(!poem["feedback"]["overall"].as_str().unwrap().is_empty());

    let (_, progress) = t.send_json(get("/progress", None)).await;
    assert_eq!(progress["total_poems"], 1);
    assert_eq!(progress["with_feedback"], 1);
    assert_eq!(progress["average_score"].as_f64().unwrap(), score as f64);
    assert_eq!(progress["themes_used"], json!(["nature"]));
}

#[tokio::test]
async fn feedback_for_unknown_poem_is_not_found() {
    let t = test_app();
    let (status, _, _) = t
        .send(post_json(
            &format!("/poems/{}/feedback", Uuid::new_v4()),
            json!({}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn themes_and_status_are_served() {
    let t = test_app();
    let (_, themes) = t.send_json(get("/themes", None)).await;
    assert_eq!(themes.as_array().unwrap().len(), 6);
    assert_eq!(themes[0]["id"], "love");

    let (_, status) = t.send_json(get("/status", None)).await;
    assert_eq!(status["status"], "connected");

    t.cloud.set_offline(true);
    let (_, status) = t.send_json(get("/status", None)).await;
    assert_eq!(status["status"], "error");
}

//=========================================================================================
// Auth routes
//=========================================================================================

#[tokio::test]
async fn session_route_requires_a_cookie() {
    let t = test_app();
    let (status, _, _) = t.send(get("/auth/session", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = t.send(get("/auth/session", Some("session=stale"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_sets_cookie_and_rejects_duplicates() {
    let t = test_app();
    let creds = json!({"email": "poet@example.com", "password": "secret1"});

    let (status, cookie, _) = t.send(post_json("/auth/signup", creds.clone(), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    let cookie = cookie.unwrap();
    assert!(cookie.starts_with("session="));

    let (status, me) = t.send_json(get("/auth/session", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "poet@example.com");

    let (status, _, _) = t.send(post_json("/auth/signup", creds, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn short_password_is_rejected_at_signup() {
    let t = test_app();
    let (status, _, _) = t
        .send(post_json(
            "/auth/signup",
            json!({"email": "poet@example.com", "password": "abc"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_merges_cloud_poems_and_logout_reverts() {
    let t = test_app();
    let user = t.auth.register("poet@example.com", "secret1");
    let from_cloud = Poem {
        id: Uuid::new_v4(),
        title: "Written Elsewhere".to_string(),
        content: "on another device".to_string(),
        theme: "dreams".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        feedback: None,
    };
    t.cloud.upsert_poem(user.user_id, &from_cloud).await.unwrap();
    t.send(post_json("/poems", poem_body("Local Only"), None)).await;

    let (status, _, _) = t
        .send(post_json(
            "/auth/login",
            json!({"email": "poet@example.com", "password": "wrong!"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, cookie, body) = t
        .send(post_json(
            "/auth/login",
            json!({"email": "poet@example.com", "password": "secret1"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let login: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(login["poems"], 2);
    let cookie = cookie.unwrap();

    let (_, poems) = t.send_json(get("/poems", Some(&cookie))).await;
    assert_eq!(poems[0]["title"], "Local Only");
    assert_eq!(poems[1]["title"], "Written Elsewhere");

    // Callers without the session only see the local poems.
    let (_, anonymous) = t.send_json(get("/poems", None)).await;
    assert_eq!(anonymous.as_array().unwrap().len(), 1);
    assert_eq!(anonymous[0]["title"], "Local Only");

    // The local-only poem is pushed up in the background.
    t.state.journal.lock().await.settle().await;
    assert_eq!(t.cloud.list_poems_for_user(user.user_id).await.unwrap().len(), 2);

    let (status, cleared, _) = t.send(post_json("/auth/logout", json!({}), Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared.as_deref(), Some("session="));

    let (_, poems) = t.send_json(get("/poems", None)).await;
    assert_eq!(poems.as_array().unwrap().len(), 1);
    let (status, _, _) = t.send(get("/auth/session", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn poems_written_while_signed_in_are_mirrored() {
    let t = test_app();
    let user = t.auth.register("poet@example.com", "secret1");
    let (_, cookie, _) = t
        .send(post_json(
            "/auth/login",
            json!({"email": "poet@example.com", "password": "secret1"}),
            None,
        ))
        .await;
    let cookie = cookie.unwrap();

    let (status, _, _) = t
        .send(post_json("/poems", poem_body("Synced"), Some(&cookie)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    t.state.journal.lock().await.settle().await;
    let cloud = t.cloud.list_poems_for_user(user.user_id).await.unwrap();
    assert_eq!(cloud.len(), 1);
    assert_eq!(cloud[0].title, "Synced");
}

//=========================================================================================
// Password reset
//=========================================================================================

#[tokio::test]
async fn malformed_reset_link_is_rejected() {
    let t = test_app();
    let (status, _, body) = t
        .send(get("/auth/password-reset/verify?token=short", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = String::from_utf8(body).unwrap();
    assert_eq!(message, ResetLinkError::Malformed.to_string());
}

#[tokio::test]
async fn reset_request_answers_the_same_for_unknown_email() {
    let t = test_app();
    let (status, _, _) = t
        .send(post_json(
            "/auth/password-reset",
            json!({"email": "nobody@example.com"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn password_reset_flow_updates_password_once() {
    let t = test_app();
    t.auth.register("poet@example.com", "secret1");

    let (status, _, _) = t
        .send(post_json(
            "/auth/password-reset",
            json!({"email": "poet@example.com"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let token = t.auth.last_token();

    let (status, _, _) = t
        .send(get(&format!("/auth/password-reset/verify?token={token}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = t
        .send(post_json(
            "/auth/password-reset/confirm",
            json!({"token": token, "password": "newpass1", "confirm_password": "newpass2"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = t
        .send(post_json(
            "/auth/password-reset/confirm",
            json!({"token": token, "password": "newpass1", "confirm_password": "newpass1"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = t
        .send(post_json(
            "/auth/login",
            json!({"email": "poet@example.com", "password": "newpass1"}),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = t
        .send(get(&format!("/auth/password-reset/verify?token={token}"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        ResetLinkError::NoSession.to_string()
    );
}

#[tokio::test]
async fn accounts_signing_in_one_after_another_keep_their_poems_apart() {
    let t = test_app();
    let alice = t.auth.register("alice@example.com", "secret1");
    let bob = t.auth.register("bob@example.com", "secret2");
    let private = Poem {
        id: Uuid::new_v4(),
        title: "Alice Private".to_string(),
        content: "for alice only".to_string(),
        theme: "love".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
        feedback: None,
    };
    t.cloud.upsert_poem(alice.user_id, &private).await.unwrap();

    let (_, alice_cookie, _) = t
        .send(post_json(
            "/auth/login",
            json!({"email": "alice@example.com", "password": "secret1"}),
            None,
        ))
        .await;
    let alice_cookie = alice_cookie.unwrap();
    let (status, _, _) = t.send(post_json("/poems", poem_body("Anon"), None)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, anonymous) = t.send_json(get("/poems", None)).await;
    assert_eq!(anonymous.as_array().unwrap().len(), 1);
    assert_eq!(anonymous[0]["title"], "Anon");

    let (_, bob_cookie, body) = t
        .send(post_json(
            "/auth/login",
            json!({"email": "bob@example.com", "password": "secret2"}),
            None,
        ))
        .await;
    let login: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(login["poems"], 1);
    let bob_cookie = bob_cookie.unwrap();

    let (_, bob_poems) = t.send_json(get("/poems", Some(&bob_cookie))).await;
    let titles: Vec<&str> = bob_poems
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Anon"]);

    // Alice's cookie is still valid but her cloud poems left with her session.
    let (_, alice_poems) = t.send_json(get("/poems", Some(&alice_cookie))).await;
    assert!(alice_poems
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["title"] != "Alice Private"));

    t.state.journal.lock().await.settle().await;
    let bob_cloud = t.cloud.list_poems_for_user(bob.user_id).await.unwrap();
    assert!(bob_cloud.iter().all(|p| p.id != private.id));
    assert_eq!(
        t.cloud.list_poems_for_user(alice.user_id).await.unwrap(),
        vec![private]
    );
}
