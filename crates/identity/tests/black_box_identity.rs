use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use zenit_auth::{Role, TokenClaims};
use zenit_core::{CompanyId, UserId};
use zenit_identity::app::{self, IdentityServices};
use zenit_identity::bootstrap;
use zenit_infra::config::BootstrapAdmin;

const JWT_SECRET: &str = "test-secret";
const ADMIN_EMAIL: &str = "admin@zenit.dev";
const ADMIN_PASSWORD: &str = "admin-password";

struct TestServer {
    root_url: String,
    base_url: String,
    services: Arc<IdentityServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let services = Arc::new(IdentityServices::in_memory(JWT_SECRET, ChronoDuration::hours(1)));

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let root_url = format!("http://{}", addr);
        let base_url = format!("{}/api", root_url);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            root_url,
            base_url,
            services,
            handle,
        }
    }

    /// Spawn with a bootstrapped admin (Root Company has code 0).
    async fn spawn_with_admin() -> Self {
        let srv = Self::spawn().await;
        bootstrap::ensure_admin(
            srv.services.store.as_ref(),
            &BootstrapAdmin {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
                root_company_name: "Root".to_string(),
            },
        )
        .await
        .unwrap();
        srv
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user_id: i64, role: Role, company_ids: &[i64]) -> String {
    let now = Utc::now();
    let claims = TokenClaims {
        user_id: UserId::new(user_id),
        role,
        company_ids: company_ids.iter().copied().map(CompanyId::new).collect(),
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn login(client: &reqwest::Client, srv: &TestServer, email: &str, password: &str) -> String {
    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

async fn create_company(client: &reqwest::Client, srv: &TestServer, token: &str, name: &str) -> Value {
    let res = client
        .post(srv.url("/companies"))
        .bearer_auth(token)
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn create_user(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    body: Value,
) -> reqwest::Response {
    client
        .post(srv.url("/users"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.root_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn registration_is_always_forbidden() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/register"))
        .json(&json!({ "email": "new@zenit.dev", "password": "whatever123", "name": "New" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("registration is disabled"));
}

#[tokio::test]
async fn login_and_verify_round_trip() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();

    let token = login(&client, &srv, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let res = client
        .get(srv.url("/auth/verify"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role"], "ADMIN");
    assert_eq!(body["companyIds"].as_array().unwrap().len(), 1);

    let res = client
        .get(srv.url("/auth/verify"))
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_credentials_are_indistinguishable() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();

    let wrong_password = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": ADMIN_EMAIL, "password": "not-the-password" }))
        .send()
        .await
        .unwrap();
    let unknown_email = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "nobody@zenit.dev", "password": "not-the-password" }))
        .send()
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let a: Value = wrong_password.json().await.unwrap();
    let b: Value = unknown_email.json().await.unwrap();
    assert_eq!(a, b);

    let missing = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": ADMIN_EMAIL }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .get(srv.url("/users"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_company_gets_code_zero() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(1, Role::Admin, &[]);

    let first = create_company(&client, &srv, &admin, "Root").await;
    let second = create_company(&client, &srv, &admin, "Acme").await;
    assert_eq!(first["code"], 0);
    assert_eq!(second["code"], 1);

    let res = client
        .get(srv.url("/companies"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let list: Vec<Value> = res.json().await.unwrap();
    assert_eq!(list.len(), 2);
}

#[tokio::test]
async fn superuser_cannot_manage_companies() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();
    let su = mint_jwt(50, Role::Superuser, &[1]);

    let res = client
        .post(srv.url("/companies"))
        .bearer_auth(&su)
        .json(&json!({ "name": "Sneaky" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/companies"))
        .bearer_auth(&su)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_role_requires_root_membership() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();
    let admin = login(&client, &srv, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let acme = create_company(&client, &srv, &admin, "Acme").await;
    let acme_id = acme["id"].as_i64().unwrap();
    let root_id = srv.services.store.root_company().await.unwrap().unwrap().id.get();

    let res = create_user(
        &client,
        &srv,
        &admin,
        json!({ "email": "a2@zenit.dev", "password": "password123", "name": "A2",
                "role": "ADMIN", "companyIds": [acme_id] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = create_user(
        &client,
        &srv,
        &admin,
        json!({ "email": "a2@zenit.dev", "password": "password123", "name": "A2",
                "role": "ADMIN", "companyIds": [root_id, acme_id] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role"], "ADMIN");
    assert!(body.get("passwordHash").is_none());
}

#[tokio::test]
async fn users_only_see_themselves() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();
    let admin = login(&client, &srv, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let acme = create_company(&client, &srv, &admin, "Acme").await;
    let acme_id = acme["id"].as_i64().unwrap();

    let mut ids = Vec::new();
    for email in ["u1@zenit.dev", "u2@zenit.dev"] {
        let res = create_user(
            &client,
            &srv,
            &admin,
            json!({ "email": email, "password": "password123", "name": "U", "companyIds": [acme_id] }),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        ids.push(body["id"].as_i64().unwrap());
    }

    let u1 = login(&client, &srv, "u1@zenit.dev", "password123").await;

    let own = client
        .get(srv.url(&format!("/users/{}", ids[0])))
        .bearer_auth(&u1)
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);

    let other = client
        .get(srv.url(&format!("/users/{}", ids[1])))
        .bearer_auth(&u1)
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);

    // Non-existent ids are not disclosed either.
    let missing = client
        .get(srv.url("/users/9999"))
        .bearer_auth(&u1)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let list: Vec<Value> = client
        .get(srv.url("/users"))
        .bearer_auth(&u1)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.len(), 1);

    let res = client
        .put(srv.url(&format!("/users/{}", ids[0])))
        .bearer_auth(&u1)
        .json(&json!({ "role": "ADMIN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .put(srv.url(&format!("/users/{}", ids[0])))
        .bearer_auth(&u1)
        .json(&json!({ "name": "Renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["name"], "Renamed");
}

#[tokio::test]
async fn superuser_is_confined_to_shared_companies() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();
    let admin = login(&client, &srv, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let a = create_company(&client, &srv, &admin, "A").await["id"].as_i64().unwrap();
    let b = create_company(&client, &srv, &admin, "B").await["id"].as_i64().unwrap();

    let res = create_user(
        &client,
        &srv,
        &admin,
        json!({ "email": "su@zenit.dev", "password": "password123", "name": "SU",
                "role": "SUPERUSER", "companyIds": [a] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let su = login(&client, &srv, "su@zenit.dev", "password123").await;

    let res = create_user(
        &client,
        &srv,
        &su,
        json!({ "email": "in-b@zenit.dev", "password": "password123", "name": "B", "companyIds": [b] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = create_user(
        &client,
        &srv,
        &su,
        json!({ "email": "promoted@zenit.dev", "password": "password123", "name": "P",
                "role": "ADMIN", "companyIds": [a] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = create_user(
        &client,
        &srv,
        &su,
        json!({ "email": "in-a@zenit.dev", "password": "password123", "name": "A", "companyIds": [a] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = create_user(
        &client,
        &srv,
        &su,
        json!({ "email": "IN-A@zenit.dev", "password": "password123", "name": "A", "companyIds": [a] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let list: Vec<Value> = client
        .get(srv.url("/users"))
        .bearer_auth(&su)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let emails: Vec<&str> = list.iter().map(|u| u["email"].as_str().unwrap()).collect();
    assert!(emails.contains(&"in-a@zenit.dev"));
    assert!(!emails.contains(&ADMIN_EMAIL));
}

#[tokio::test]
async fn company_with_members_cannot_be_deleted() {
    let srv = TestServer::spawn_with_admin().await;
    let client = reqwest::Client::new();
    let admin = login(&client, &srv, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let acme = create_company(&client, &srv, &admin, "Acme").await["id"].as_i64().unwrap();

    let res = create_user(
        &client,
        &srv,
        &admin,
        json!({ "email": "member@zenit.dev", "password": "password123", "name": "M", "companyIds": [acme] }),
    )
    .await;
    let member: Value = res.json().await.unwrap();

    let res = client
        .delete(srv.url(&format!("/companies/{acme}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .delete(srv.url(&format!("/users/{}", member["id"])))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .delete(srv.url(&format!("/companies/{acme}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.url(&format!("/companies/{acme}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
