//! End-to-end tests that drive the HTTP surface exactly as a client would:
//! mint a token, issue requests over a real TCP listener, assert on status
//! codes and JSON bodies. Requires a reachable Postgres at `DATABASE_URL`
//! (or `TEST_DATABASE_URL` as a fallback) — the server migrates its own
//! schema on startup, so any empty database works.

use std::time::Duration;

use chrono::Utc;
use eln_auth::claims::{Hs256JwtValidator, JwtClaims};
use eln_auth::PasswordHasher;
use eln_core::id::{DeviceId, ExperimentId, UserId};
use eln_core::user::Role;
use eln_infra::AppConfig;
use reqwest::StatusCode;
use serde_json::json;
use sqlx::PgPool;

struct TestServer {
    base_url: String,
    pool: PgPool,
    jwt_secret: Vec<u8>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("TEST_DATABASE_URL"))
            .expect("DATABASE_URL or TEST_DATABASE_URL must point at a reachable Postgres for black-box tests");

        let jwt_secret = format!("test-jwt-secret-{}", uuid::Uuid::now_v7()).into_bytes();
        let config = AppConfig {
            database_url,
            jwt_secret: jwt_secret.clone(),
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(60 * 60 * 24 * 30),
            signed_url_secret: b"test-signed-url-secret".to_vec(),
            upload_url_ttl: Duration::from_secs(900),
            download_url_ttl: Duration::from_secs(300),
            attachment_max_size_bytes: 5 * 1024 * 1024 * 1024,
            require_tls: false,
            object_store_base_url: "http://localhost:9999/eln-attachments".to_string(),
            object_store_list_endpoint: "http://localhost:9999/eln-attachments/_list".to_string(),
            object_store_bearer_token: String::new(),
            reconcile_tick_secs: 3600,
            reconcile_stale_after_secs: 3600,
            reconcile_scan_limit: 500,
        };

        let pool = eln_infra::db::connect(&config.database_url)
            .await
            .expect("failed to connect to test database");
        eln_infra::db::migrate(&pool).await.expect("failed to migrate test database");

        let app = eln_api::app::build_app(config).await.expect("failed to build app");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, pool, jwt_secret, handle }
    }

    fn mint_token(&self, user_id: UserId, role: Role, device_id: &str) -> String {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            role,
            device_id: DeviceId::new(device_id),
            issued_at: now - chrono::Duration::seconds(1),
            expires_at: now + chrono::Duration::minutes(10),
        };
        Hs256JwtValidator::new(self.jwt_secret.clone())
            .encode(&claims)
            .expect("failed to encode test jwt")
    }

    async fn seed_user(&self, email: &str, password: &str, role: Role) -> UserId {
        let user_id = UserId::new();
        let hasher = PasswordHasher::new();
        let password_hash = hasher.hash(password).expect("failed to hash test password");

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, display_name, role, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id.as_uuid())
        .bind(eln_core::user::User::normalize_email(email))
        .bind(password_hash)
        .bind("Test User")
        .bind(role.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .expect("failed to seed test user");

        user_id
    }

    async fn grant_viewer(&self, experiment_id: ExperimentId, viewer_id: UserId) {
        sqlx::query("INSERT INTO experiment_viewer_grants (experiment_id, user_id) VALUES ($1, $2)")
            .bind(experiment_id.as_uuid())
            .bind(viewer_id.as_uuid())
            .execute(&self.pool)
            .await
            .expect("failed to seed viewer grant");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/v1/sync/pull", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn healthz_is_reachable_without_a_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/healthz", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_refresh_and_logout_round_trip() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.seed_user("alice@example.com", "correct horse battery staple", Role::Owner)
        .await;

    let res = client
        .post(format!("{}/v1/auth/login", srv.base_url))
        .json(&json!({
            "email": "alice@example.com",
            "password": "correct horse battery staple",
            "deviceName": "alices-laptop",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session: serde_json::Value = res.json().await.unwrap();
    let refresh_token = session["refreshToken"].as_str().unwrap().to_string();
    assert!(session["accessToken"].as_str().unwrap().len() > 0);

    let res = client
        .post(format!("{}/v1/auth/refresh", srv.base_url))
        .json(&json!({ "refreshToken": refresh_token, "deviceName": "alices-laptop" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let refreshed: serde_json::Value = res.json().await.unwrap();
    let new_refresh_token = refreshed["refreshToken"].as_str().unwrap().to_string();

    // The rotated-out refresh token is single-use: replaying it fails.
    let res = client
        .post(format!("{}/v1/auth/refresh", srv.base_url))
        .json(&json!({ "refreshToken": refresh_token, "deviceName": "alices-laptop" }))
        .send()
        .await
        .unwrap();
    assert_ne!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/v1/auth/logout", srv.base_url))
        .json(&json!({ "refreshToken": new_refresh_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.seed_user("bob@example.com", "the-right-password", Role::Owner).await;

    let res = client
        .post(format!("{}/v1/auth/login", srv.base_url))
        .json(&json!({
            "email": "bob@example.com",
            "password": "the-wrong-password",
            "deviceName": "bobs-phone",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn experiment_create_addendum_and_complete_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv.seed_user("owner1@example.com", "irrelevant", Role::Owner).await;
    let token = srv.mint_token(owner_id, Role::Owner, "owner-device");

    let res = client
        .post(format!("{}/v1/experiments", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "Catalyst screen", "originalBody": "Initial observations." }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let created: serde_json::Value = res.json().await.unwrap();
    let experiment_id = created["experimentId"].as_str().unwrap().to_string();
    let original_entry_id = created["originalEntryId"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "draft");

    let res = client
        .post(format!("{}/v1/experiments/{}/addendums", srv.base_url, experiment_id))
        .bearer_auth(&token)
        .json(&json!({ "baseEntryId": original_entry_id, "body": "Yield was higher than expected." }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let added: serde_json::Value = res.json().await.unwrap();
    let second_entry_id = added["entryId"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/v1/experiments/{}/complete", srv.base_url, experiment_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/v1/experiments/{}", srv.base_url, experiment_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view: serde_json::Value = res.json().await.unwrap();
    assert_eq!(view["effectiveEntryId"], second_entry_id);
    assert_eq!(view["effectiveBody"], "Yield was higher than expected.");
    assert_eq!(view["experiment"]["status"], "completed");

    let res = client
        .get(format!("{}/v1/experiments/{}/history", srv.base_url, experiment_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let history: serde_json::Value = res.json().await.unwrap();
    assert_eq!(history["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn stale_base_addendum_is_rejected_with_conflict_artifact() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv.seed_user("owner2@example.com", "irrelevant", Role::Owner).await;
    let token = srv.mint_token(owner_id, Role::Owner, "owner-device");

    let created: serde_json::Value = client
        .post(format!("{}/v1/experiments", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "Stale base test", "originalBody": "v0" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let experiment_id = created["experimentId"].as_str().unwrap().to_string();
    let original_entry_id = created["originalEntryId"].as_str().unwrap().to_string();

    // A first, legitimate addendum moves the head forward.
    let res = client
        .post(format!("{}/v1/experiments/{}/addendums", srv.base_url, experiment_id))
        .bearer_auth(&token)
        .json(&json!({ "baseEntryId": original_entry_id, "body": "v1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // A second client, unaware of the first addendum, still bases off the
    // original entry: rejected as a stale-base conflict.
    let res = client
        .post(format!("{}/v1/experiments/{}/addendums", srv.base_url, experiment_id))
        .bearer_auth(&token)
        .json(&json!({ "baseEntryId": original_entry_id, "body": "v1-from-a-stale-client" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["experimentId"], experiment_id);
    assert_eq!(body["clientBaseEntryId"], original_entry_id);
    assert!(body["conflictArtifactId"].as_str().unwrap().len() > 0);
    assert!(body["serverLatestEntryId"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn write_forbidden_for_non_owner_role() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv.seed_user("owner3@example.com", "irrelevant", Role::Owner).await;
    let viewer_id = srv.seed_user("viewer3@example.com", "irrelevant", Role::Viewer).await;
    let owner_token = srv.mint_token(owner_id, Role::Owner, "owner-device");
    let viewer_token = srv.mint_token(viewer_id, Role::Viewer, "viewer-device");

    let created: serde_json::Value = client
        .post(format!("{}/v1/experiments", srv.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({ "title": "Owned by owner3", "originalBody": "v0" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let experiment_id = created["experimentId"].as_str().unwrap().to_string();
    let original_entry_id = created["originalEntryId"].as_str().unwrap().to_string();

    // Viewer cannot add an addendum to someone else's experiment.
    let res = client
        .post(format!("{}/v1/experiments/{}/addendums", srv.base_url, experiment_id))
        .bearer_auth(&viewer_token)
        .json(&json!({ "baseEntryId": original_entry_id, "body": "unauthorized write" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Viewer cannot read the draft experiment either (no grant, not an admin).
    let res = client
        .get(format!("{}/v1/experiments/{}", srv.base_url, experiment_id))
        .bearer_auth(&viewer_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn viewer_with_grant_can_read_completed_experiment() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv.seed_user("owner4@example.com", "irrelevant", Role::Owner).await;
    let viewer_id = srv.seed_user("viewer4@example.com", "irrelevant", Role::Viewer).await;
    let owner_token = srv.mint_token(owner_id, Role::Owner, "owner-device");
    let viewer_token = srv.mint_token(viewer_id, Role::Viewer, "viewer-device");

    let created: serde_json::Value = client
        .post(format!("{}/v1/experiments", srv.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({ "title": "Shared with viewer4", "originalBody": "v0" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let experiment_id: ExperimentId = created["experimentId"].as_str().unwrap().parse().unwrap();

    client
        .post(format!("{}/v1/experiments/{}/complete", srv.base_url, experiment_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();

    // Without a grant the viewer still can't read it.
    let res = client
        .get(format!("{}/v1/experiments/{}", srv.base_url, experiment_id))
        .bearer_auth(&viewer_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    srv.grant_viewer(experiment_id, viewer_id).await;

    let res = client
        .get(format!("{}/v1/experiments/{}", srv.base_url, experiment_id))
        .bearer_auth(&viewer_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn attachment_initiate_complete_and_download_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv.seed_user("owner5@example.com", "irrelevant", Role::Owner).await;
    let token = srv.mint_token(owner_id, Role::Owner, "owner-device");

    let created: serde_json::Value = client
        .post(format!("{}/v1/experiments", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "Spectra", "originalBody": "v0" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let experiment_id = created["experimentId"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/v1/attachments/initiate", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "experimentId": experiment_id,
            "objectKey": format!("spectra/{}.csv", uuid::Uuid::now_v7()),
            "sizeBytes": 2048,
            "mimeType": "text/csv",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let initiated: serde_json::Value = res.json().await.unwrap();
    let attachment_id = initiated["attachmentId"].as_str().unwrap().to_string();
    assert!(initiated["uploadUrl"].as_str().unwrap().len() > 0);

    let checksum = "a".repeat(64);
    let res = client
        .post(format!("{}/v1/attachments/{}/complete", srv.base_url, attachment_id))
        .bearer_auth(&token)
        .json(&json!({ "checksum": checksum, "sizeBytes": 2048 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/v1/attachments/{}/download", srv.base_url, attachment_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let grant: serde_json::Value = res.json().await.unwrap();
    assert!(grant["downloadUrl"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn signature_requires_correct_password_and_then_verifies() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv
        .seed_user("owner6@example.com", "the-signing-password", Role::Owner)
        .await;
    let token = srv.mint_token(owner_id, Role::Owner, "owner-device");

    let created: serde_json::Value = client
        .post(format!("{}/v1/experiments", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "Controlled substance log", "originalBody": "v0" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let experiment_id = created["experimentId"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/v1/signatures", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "experimentId": experiment_id,
            "password": "wrong-password",
            "signatureType": "approval",
            "meaning": "I approve these results",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("{}/v1/signatures", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "experimentId": experiment_id,
            "password": "the-signing-password",
            "signatureType": "approval",
            "meaning": "I approve these results",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/v1/experiments/{}/signatures/verify", srv.base_url, experiment_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let signatures = body["signatures"].as_array().unwrap();
    assert_eq!(signatures.len(), 1);
    assert_eq!(signatures[0]["valid"], true);
}

#[tokio::test]
async fn ops_endpoints_require_admin_role() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv.seed_user("owner7@example.com", "irrelevant", Role::Owner).await;
    let admin_id = srv.seed_user("admin7@example.com", "irrelevant", Role::Admin).await;
    let owner_token = srv.mint_token(owner_id, Role::Owner, "owner-device");
    let admin_token = srv.mint_token(admin_id, Role::Admin, "admin-device");

    let res = client
        .get(format!("{}/v1/ops/audit/verify", srv.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(format!("{}/v1/ops/audit/verify", srv.base_url))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn sync_pull_reflects_mutations_for_their_owner() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let owner_id = srv.seed_user("owner8@example.com", "irrelevant", Role::Owner).await;
    let token = srv.mint_token(owner_id, Role::Owner, "owner-device");

    let res = client
        .get(format!("{}/v1/sync/pull?cursor=0", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let before: serde_json::Value = res.json().await.unwrap();
    let starting_count = before["events"].as_array().unwrap().len();

    client
        .post(format!("{}/v1/experiments", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "Sync probe", "originalBody": "v0" }))
        .send()
        .await
        .unwrap();

    let res = client
        .get(format!("{}/v1/sync/pull?cursor=0", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let after: serde_json::Value = res.json().await.unwrap();
    assert!(after["events"].as_array().unwrap().len() > starting_count);
    assert!(after["cursor"].as_i64().unwrap() > 0);
}
