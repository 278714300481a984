use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use reqwest::StatusCode;
use serde_json::{Value, json};

use zenit_api::app::{self as financial, FinancialServices};
use zenit_auth::{Identity, IdentityVerifier, Role};
use zenit_core::{CompanyId, UserId};
use zenit_identity::app::{self as identity, IdentityServices};
use zenit_identity::bootstrap;
use zenit_infra::config::BootstrapAdmin;
use zenit_infra::external::RemoteIdentityVerifier;

const ADMIN_EMAIL: &str = "admin@zenit.dev";
const ADMIN_PASSWORD: &str = "admin-password";
const PASSWORD: &str = "password123";

struct Spawned {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Spawned {
    async fn serve(app: axum::Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/api", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for Spawned {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A real identity service plus a financial service verifying against it.
struct TestStack {
    core: Spawned,
    fin: Spawned,
    client: reqwest::Client,
}

impl TestStack {
    async fn spawn() -> Self {
        let identity_services =
            Arc::new(IdentityServices::in_memory("stack-secret", ChronoDuration::hours(1)));
        bootstrap::ensure_admin(
            identity_services.store.as_ref(),
            &BootstrapAdmin {
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
                root_company_name: "Root".to_string(),
            },
        )
        .await
        .unwrap();
        let core = Spawned::serve(identity::build_app(identity_services)).await;

        let verifier = RemoteIdentityVerifier::new(&core.base_url, Duration::from_secs(2)).unwrap();
        let fin = Spawned::serve(financial::build_app(Arc::new(FinancialServices::in_memory(
            Arc::new(verifier),
        ))))
        .await;

        Self {
            core,
            fin,
            client: reqwest::Client::new(),
        }
    }

    fn core_url(&self, path: &str) -> String {
        format!("{}{}", self.core.base_url, path)
    }

    fn fin_url(&self, path: &str) -> String {
        format!("{}{}", self.fin.base_url, path)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let res = self
            .client
            .post(self.core_url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    async fn company(&self, admin: &str, name: &str) -> i64 {
        let res = self
            .client
            .post(self.core_url("/companies"))
            .bearer_auth(admin)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        body["id"].as_i64().unwrap()
    }

    /// Create a user through the identity API and return their token.
    async fn user(&self, admin: &str, email: &str, role: &str, companies: &[i64]) -> String {
        let res = self
            .client
            .post(self.core_url("/users"))
            .bearer_auth(admin)
            .json(&json!({
                "email": email,
                "password": PASSWORD,
                "name": email,
                "role": role,
                "companyIds": companies,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        self.login(email, PASSWORD).await
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.fin_url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.fin_url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.fin_url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .delete(self.fin_url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn balance(&self, token: &str, account_id: i64) -> String {
        let res = self.get(token, &format!("/financial-accounts/{account_id}")).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["balance"].as_str().unwrap().to_string()
    }
}

async fn error_of(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let stack = TestStack::spawn().await;

    let res = stack.client.get(stack.fin_url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = stack
        .client
        .get(stack.fin_url("/financial-accounts"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = stack.get("forged.token.value", "/me").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_reports_identity_and_default_tenant() {
    let stack = TestStack::spawn().await;
    let admin = stack.admin().await;
    let a = stack.company(&admin, "A").await;
    let b = stack.company(&admin, "B").await;
    let su = stack.user(&admin, "su@zenit.dev", "SUPERUSER", &[b, a]).await;

    let res = stack.get(&su, "/me").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["role"], "SUPERUSER");
    assert_eq!(body["companyId"], b);
}

#[tokio::test]
async fn tenant_isolation_across_sources() {
    let stack = TestStack::spawn().await;
    let admin = stack.admin().await;
    let a = stack.company(&admin, "A").await;
    let b = stack.company(&admin, "B").await;
    let su = stack.user(&admin, "su@zenit.dev", "SUPERUSER", &[a]).await;

    let res = stack.get(&su, &format!("/companies/{b}/financial-accounts")).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = stack.get(&su, &format!("/financial-accounts?companyId={b}")).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = stack
        .post(
            &su,
            "/financial-accounts",
            json!({ "companyId": b, "name": "Sneaky", "type": "checking", "balance": 0 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = stack.get(&su, "/financial-accounts?companyId=abc").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "invalid companyId");

    let res = stack.get(&su, &format!("/companies/{a}/financial-accounts")).await;
    assert_eq!(res.status(), StatusCode::OK);

    // ADMIN reaches every company.
    let res = stack.get(&admin, &format!("/companies/{b}/financial-accounts")).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn data_is_scoped_to_the_resolved_company() {
    let stack = TestStack::spawn().await;
    let admin = stack.admin().await;
    let a = stack.company(&admin, "A").await;
    let b = stack.company(&admin, "B").await;
    let su = stack.user(&admin, "su@zenit.dev", "SUPERUSER", &[a, b]).await;

    let res = stack
        .post(
            &su,
            &format!("/companies/{a}/financial-accounts"),
            json!({ "name": "Checking A", "type": "checking", "balance": 10 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let account: Value = res.json().await.unwrap();
    assert_eq!(account["companyId"], a);

    let res = stack.get(&su, &format!("/companies/{b}/financial-accounts")).await;
    let list: Vec<Value> = res.json().await.unwrap();
    assert!(list.is_empty());

    let res = stack
        .get(&su, &format!("/companies/{b}/financial-accounts/{}", account["id"]))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // A transaction in B may not point at A's account.
    let res = stack
        .post(
            &su,
            &format!("/companies/{b}/financial-transactions"),
            json!({
                "accountId": account["id"], "description": "x", "amount": 5,
                "date": "2024-05-01", "type": "expense", "status": "completed"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn balance_follows_transaction_lifecycle() {
    let stack = TestStack::spawn().await;
    let admin = stack.admin().await;
    let a = stack.company(&admin, "A").await;
    let user = stack.user(&admin, "user@zenit.dev", "USER", &[a]).await;

    let res = stack
        .post(
            &user,
            "/financial-accounts",
            json!({ "name": "Checking", "type": "checking", "balance": 100 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let account: Value = res.json().await.unwrap();
    let account_id = account["id"].as_i64().unwrap();
    assert_eq!(account["balance"], "100.00");

    let res = stack
        .post(
            &user,
            "/financial-categories",
            json!({ "name": "Rent", "type": "expense" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let category: Value = res.json().await.unwrap();
    assert_eq!(category["color"], "#3B82F6");

    let res = stack
        .post(
            &user,
            "/financial-transactions",
            json!({
                "accountId": account_id, "categoryId": category["id"],
                "description": "May rent", "amount": "25.50",
                "date": "2024-05-01T10:00:00Z", "type": "expense", "status": "completed"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let tx: Value = res.json().await.unwrap();
    let tx_id = tx["id"].as_i64().unwrap();
    assert_eq!(stack.balance(&user, account_id).await, "74.50");

    let res = stack
        .put(&user, &format!("/financial-transactions/{tx_id}"), json!({ "status": "cancelled" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(stack.balance(&user, account_id).await, "100.00");

    let res = stack
        .put(
            &user,
            &format!("/financial-transactions/{tx_id}"),
            json!({ "status": "completed", "type": "income" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(stack.balance(&user, account_id).await, "125.50");

    // Account deletion is blocked while the transaction exists.
    let res = stack.delete(&user, &format!("/financial-accounts/{account_id}")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "cannot delete account with linked transactions");

    let res = stack
        .delete(&user, &format!("/financial-categories/{}", category["id"]))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "cannot delete category with linked transactions");

    let res = stack.delete(&user, &format!("/financial-transactions/{tx_id}")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(stack.balance(&user, account_id).await, "100.00");

    let res = stack.delete(&user, &format!("/financial-accounts/{account_id}")).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn balance_is_not_directly_editable() {
    let stack = TestStack::spawn().await;
    let admin = stack.admin().await;

    let res = stack
        .post(
            &admin,
            "/financial-accounts",
            json!({ "name": "Cash", "type": "wallet", "balance": 0 }),
        )
        .await;
    let account: Value = res.json().await.unwrap();

    let res = stack
        .put(
            &admin,
            &format!("/financial-accounts/{}", account["id"]),
            json!({ "balance": 1000000 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = stack
        .put(
            &admin,
            &format!("/financial-accounts/{}", account["id"]),
            json!({ "name": "Petty cash", "isActive": false }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["name"], "Petty cash");
    assert_eq!(body["isActive"], false);
    assert_eq!(body["balance"], "0.00");
}

#[tokio::test]
async fn transaction_listing_filters_and_embeds_names() {
    let stack = TestStack::spawn().await;
    let admin = stack.admin().await;

    let account: Value = stack
        .post(
            &admin,
            "/financial-accounts",
            json!({ "name": "Main", "type": "checking", "balance": 0 }),
        )
        .await
        .json()
        .await
        .unwrap();
    let salary: Value = stack
        .post(
            &admin,
            "/financial-categories",
            json!({ "name": "Salary", "type": "income", "color": "#00AA00" }),
        )
        .await
        .json()
        .await
        .unwrap();

    for (day, kind, status) in [
        ("2024-05-01", "income", "completed"),
        ("2024-05-15", "expense", "pending"),
        ("2024-06-01", "income", "completed"),
    ] {
        let res = stack
            .post(
                &admin,
                "/financial-transactions",
                json!({
                    "accountId": account["id"], "categoryId": salary["id"],
                    "description": format!("{kind} {day}"), "amount": 10,
                    "date": day, "type": kind, "status": status
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let all: Vec<Value> = stack.get(&admin, "/financial-transactions").await.json().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["description"], "income 2024-06-01");
    assert_eq!(all[0]["account"]["name"], "Main");
    assert_eq!(all[0]["category"]["color"], "#00AA00");

    let may: Vec<Value> = stack
        .get(&admin, "/financial-transactions?startDate=2024-05-01&endDate=2024-05-31")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(may.len(), 2);

    let completed_income: Vec<Value> = stack
        .get(&admin, "/financial-transactions?type=income&status=completed")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(completed_income.len(), 2);

    let res = stack.get(&admin, "/financial-transactions?status=lost").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let incomes: Vec<Value> = stack
        .get(&admin, "/financial-categories?type=income")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(incomes.len(), 1);

    assert_eq!(stack.balance(&admin, account["id"].as_i64().unwrap()).await, "20.00");

    let detail: Value = stack
        .get(&admin, &format!("/financial-transactions/{}", all[0]["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["account"]["type"], "checking");
    assert_eq!(detail["category"]["name"], "Salary");
}

#[tokio::test]
async fn unreachable_identity_service_fails_closed() {
    let verifier =
        RemoteIdentityVerifier::new("http://127.0.0.1:9/api", Duration::from_millis(200)).unwrap();
    let fin = Spawned::serve(financial::build_app(Arc::new(FinancialServices::in_memory(
        Arc::new(verifier),
    ))))
    .await;

    let res = reqwest::Client::new()
        .get(format!("{}/me", fin.base_url))
        .bearer_auth("whatever")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

/// Accepts one fixed token as the given identity.
struct FixedVerifier(Identity);

#[async_trait::async_trait]
impl IdentityVerifier for FixedVerifier {
    async fn verify(&self, bearer_token: &str) -> Option<Identity> {
        (bearer_token == "fixed").then(|| self.0.clone())
    }
}

#[tokio::test]
async fn user_without_companies_has_no_tenant() {
    let orphan = Identity::new(UserId::new(9), Role::User, Vec::<CompanyId>::new());
    let fin = Spawned::serve(financial::build_app(Arc::new(FinancialServices::in_memory(
        Arc::new(FixedVerifier(orphan)),
    ))))
    .await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/financial-accounts", fin.base_url))
        .bearer_auth("fixed")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_of(res).await, "tenant not defined");

    let res = client
        .get(format!("{}/financial-accounts", fin.base_url))
        .bearer_auth("other")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
