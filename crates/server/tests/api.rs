use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use db::{
    DBService,
    models::user::{User, UserRole},
};
use local_deployment::LocalDeployment;
use reqwest::{Response, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use server::routes;
use services::services::{
    config::Config,
    email::{EmailError, EmailMessage, EmailSender},
    github::{GitHubError, RepoDocument, RepoRef, SourceHost},
    payments::{
        CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway, ProcessorRefund,
        RefundRequest,
    },
    stripe_webhook::sign_payload,
};
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_test_secret";

#[derive(Default)]
struct RecordingEmail {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmail {
    /// The code from the most recent sign-in email to `to`.
    fn last_code(&self, to: &str) -> String {
        let sent = self.sent.lock().unwrap();
        let message = sent
            .iter()
            .rev()
            .find(|m| m.to == to && m.subject.contains("sign-in code"))
            .expect("no sign-in email");
        message.subject.rsplit(' ').next().unwrap().to_string()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakePayments {
    checkouts: Mutex<Vec<CheckoutSessionRequest>>,
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request.clone());
        let id = format!("cs_test_{}", checkouts.len());
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.test/{id}")),
            id,
        })
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<ProcessorRefund, PaymentError> {
        Ok(ProcessorRefund {
            id: format!("re_{}", request.idempotency_key),
            status: Some("succeeded".to_string()),
        })
    }
}

struct NoSource;

#[async_trait]
impl SourceHost for NoSource {
    async fn fetch_readme(&self, _repo: &RepoRef, _token: Option<&str>) -> Result<Option<String>, GitHubError> {
        Ok(None)
    }

    async fn fetch_docs(&self, _repo: &RepoRef, _token: Option<&str>) -> Result<Vec<RepoDocument>, GitHubError> {
        Ok(Vec::new())
    }
}

struct TestApp {
    base_url: String,
    client: reqwest::Client,
    db: DBService,
    email: Arc<RecordingEmail>,
    payments: Arc<FakePayments>,
}

async fn spawn_app(with_payments: bool) -> TestApp {
    let db = DBService::new_in_memory().await.unwrap();
    let mut config = Config::for_development().unwrap();
    config.stripe_webhook_secret = Some(SecretString::from(WEBHOOK_SECRET));

    let email = Arc::new(RecordingEmail::default());
    let payments = Arc::new(FakePayments::default());
    let gateway: Option<Arc<dyn PaymentGateway>> = if with_payments {
        Some(payments.clone())
    } else {
        None
    };
    let deployment = LocalDeployment::from_parts(
        config,
        db.clone(),
        email.clone(),
        gateway,
        None,
        Arc::new(NoSource),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::router(deployment);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{addr}/api"),
        client: reqwest::Client::new(),
        db,
        email,
        payments,
    }
}

impl TestApp {
    fn request(&self, method: reqwest::Method, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Response {
        self.request(reqwest::Method::GET, path, token).send().await.unwrap()
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        self.request(reqwest::Method::POST, path, token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        self.request(reqwest::Method::PUT, path, token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str, token: Option<&str>) -> Response {
        self.request(reqwest::Method::DELETE, path, token).send().await.unwrap()
    }

    /// Full OTP sign-in; returns the session token and user id.
    async fn sign_in(&self, email: &str) -> (String, Uuid) {
        let res = self.post("/auth/request-code", None, json!({ "email": email })).await;
        assert_eq!(res.status(), StatusCode::OK);
        let code = self.email.last_code(email);

        let res = self
            .post("/auth/verify", None, json!({ "email": email, "code": code }))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        let token = body["data"]["token"].as_str().unwrap().to_string();
        let id = body["data"]["user"]["id"].as_str().unwrap().parse().unwrap();
        (token, id)
    }

    async fn sign_in_admin(&self, email: &str) -> String {
        let (token, id) = self.sign_in(email).await;
        User::update_role(&self.db.pool, id, UserRole::Admin).await.unwrap();
        token
    }

    async fn post_webhook(&self, payload: &Value, signature: Option<String>) -> Response {
        let body = serde_json::to_vec(payload).unwrap();
        let signature =
            signature.unwrap_or_else(|| sign_payload(&body, WEBHOOK_SECRET, Utc::now().timestamp()));
        self.client
            .post(format!("{}/webhooks/stripe", self.base_url))
            .header("Stripe-Signature", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }

    /// Live campaign with one milestone carrying the full release.
    async fn live_campaign(&self, token: &str, goal_cents: i64) -> String {
        let res = self
            .post(
                "/campaigns",
                Some(token),
                json!({ "title": "Harden the prototype", "funding_goal_cents": goal_cents }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let res = self
            .post(
                &format!("/campaigns/{id}/milestones"),
                Some(token),
                json!({ "name": "Launch", "pct": 100 }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = self
            .post(
                &format!("/campaigns/{id}/transition"),
                Some(token),
                json!({ "action": "publish" }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        id
    }
}

async fn json_body(res: Response) -> Value {
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app(true).await;
    let res = app.get("/health", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn sign_in_with_bearer_or_cookie() {
    let app = spawn_app(true).await;

    let res = app.get("/auth/me", None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(res).await["error_data"]["kind"], "unauthorized");

    app.post("/auth/request-code", None, json!({ "email": "Maker@Example.com" }))
        .await;
    let res = app
        .post("/auth/verify", None, json!({ "email": "maker@example.com", "code": "not-it" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let code = app.email.last_code("maker@example.com");
    let res = app
        .post("/auth/verify", None, json!({ "email": "maker@example.com", "code": code }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));
    let body = json_body(res).await;
    assert_eq!(body["data"]["created"], true);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let res = app.get("/auth/me", Some(&token)).await;
    assert_eq!(json_body(res).await["data"]["email"], "maker@example.com");

    let res = app
        .client
        .get(format!("{}/users/me", app.base_url))
        .header("Cookie", format!("session={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.get("/auth/me", Some("garbage")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_and_notification_settings() {
    let app = spawn_app(true).await;
    let (token, _) = app.sign_in("backer@example.com").await;

    let res = app.put("/users/me", Some(&token), json!({ "name": "  Ada  " })).await;
    assert_eq!(json_body(res).await["data"]["name"], "Ada");

    let res = app.get("/users/me/settings", Some(&token)).await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["email_on_pledge"], true);
    assert_eq!(body["data"]["marketing_emails"], false);

    let res = app
        .put("/users/me/settings", Some(&token), json!({ "email_on_campaign_update": false }))
        .await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["email_on_campaign_update"], false);
    assert_eq!(body["data"]["email_on_pledge"], true);

    let res = app.get("/users/me/pledges", Some(&token)).await;
    assert_eq!(json_body(res).await["data"], json!([]));
}

#[tokio::test]
async fn campaign_lifecycle_and_permissions() {
    let app = spawn_app(true).await;
    let (maker, _) = app.sign_in("maker@example.com").await;
    let (stranger, _) = app.sign_in("stranger@example.com").await;

    let res = app
        .post("/campaigns", Some(&maker), json!({ "title": "", "funding_goal_cents": 0 }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["error_data"]["kind"], "validation");
    assert!(body["error_data"]["fields"]["funding_goal_cents"].is_string());
    assert!(body["error_data"]["fields"]["title"].is_string());

    let res = app
        .post(
            "/campaigns",
            Some(&maker),
            json!({ "title": "Ship the beta", "funding_goal_cents": 50_000 }),
        )
        .await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["status"], "draft");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    // Drafts are hidden from everyone but editors
    assert_eq!(app.get(&format!("/campaigns/{id}"), None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.get(&format!("/campaigns/{id}"), Some(&stranger)).await.status(),
        StatusCode::NOT_FOUND
    );

    let res = app
        .post(&format!("/campaigns/{id}/transition"), Some(&maker), json!({ "action": "publish" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    app.post(
        &format!("/campaigns/{id}/milestones"),
        Some(&maker),
        json!({ "name": "Alpha", "pct": 40 }),
    )
    .await;
    let res = app
        .post(
            &format!("/campaigns/{id}/milestones"),
            Some(&maker),
            json!({ "name": "Too much", "pct": 70 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    app.post(
        &format!("/campaigns/{id}/milestones"),
        Some(&maker),
        json!({ "name": "Beta", "pct": 60 }),
    )
    .await;

    let res = app
        .post(&format!("/campaigns/{id}/transition"), Some(&maker), json!({ "action": "publish" }))
        .await;
    assert_eq!(json_body(res).await["data"]["status"], "live");

    let res = app.get(&format!("/campaigns/{id}"), None).await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["funding"]["goal_cents"], 50_000);
    assert_eq!(body["data"]["milestones"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["can_edit"], false);

    let res = app
        .put(&format!("/campaigns/{id}"), Some(&stranger), json!({ "title": "Mine now" }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app.get("/campaigns", None).await;
    assert_eq!(json_body(res).await["data"].as_array().unwrap().len(), 1);
    assert_eq!(app.get("/campaigns?mine=true", None).await.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .post(&format!("/campaigns/{id}/transition"), Some(&maker), json!({ "action": "publish" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn team_members_can_edit() {
    let app = spawn_app(true).await;
    let (maker, _) = app.sign_in("maker@example.com").await;
    let (teammate, teammate_id) = app.sign_in("team@example.com").await;
    let id = app.live_campaign(&maker, 10_000).await;

    let res = app
        .post(&format!("/campaigns/{id}/team"), Some(&maker), json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .post(&format!("/campaigns/{id}/team"), Some(&maker), json!({ "email": "team@example.com" }))
        .await;
    assert_eq!(json_body(res).await["data"].as_array().unwrap().len(), 1);

    let res = app
        .post(
            &format!("/campaigns/{id}/pledge-tiers"),
            Some(&teammate),
            json!({ "title": "Supporter", "amount_cents": 2_500 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .delete(&format!("/campaigns/{id}/team/{teammate_id}"), Some(&maker))
        .await;
    assert_eq!(json_body(res).await["data"], json!([]));

    let res = app
        .post(
            &format!("/campaigns/{id}/stretch-goals"),
            Some(&teammate),
            json!({ "title": "Dark mode", "target_cents": 20_000 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn checkout_webhook_and_refund_flow() {
    let app = spawn_app(true).await;
    let (maker, _) = app.sign_in("maker@example.com").await;
    let (backer, backer_id) = app.sign_in("backer@example.com").await;
    let id = app.live_campaign(&maker, 10_000).await;

    let res = app
        .post(&format!("/campaigns/{id}/checkout"), Some(&backer), json!({ "amount_cents": 50 }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .post(&format!("/campaigns/{id}/checkout"), Some(&backer), json!({ "amount_cents": 5_000 }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["data"]["session_id"], "cs_test_1");
    {
        let checkouts = app.payments.checkouts.lock().unwrap();
        assert_eq!(checkouts[0].application_fee_cents, 250);
        assert!(checkouts[0].success_url.ends_with("?pledge=success"));
    }

    let event = json!({
        "id": "evt_checkout_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "amount_total": 5_000,
            "currency": "usd",
            "payment_status": "paid",
            "payment_intent": "pi_test_1",
            "metadata": { "campaign_id": id, "backer_id": backer_id.to_string() }
        }}
    });

    let res = app.post_webhook(&event, Some("t=1,v1=deadbeef".to_string())).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.post_webhook(&event, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!({ "received": true, "duplicate": false }));
    let res = app.post_webhook(&event, None).await;
    assert_eq!(json_body(res).await, json!({ "received": true, "duplicate": true }));

    let res = app.get("/users/me/pledges", Some(&backer)).await;
    let body = json_body(res).await;
    let pledge = &body["data"][0];
    assert_eq!(pledge["status"], "captured");
    let pledge_id = pledge["id"].as_str().unwrap().to_string();

    // Backers cannot refund themselves
    let res = app
        .post(&format!("/pledges/{pledge_id}/refunds"), Some(&backer), json!({ "amount_cents": 100 }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .post(&format!("/pledges/{pledge_id}/refunds"), Some(&maker), json!({ "amount_cents": 1_000 }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["data"]["status"], "succeeded");

    let res = app
        .post(&format!("/pledges/{pledge_id}/refunds"), Some(&maker), json!({ "amount_cents": 4_001 }))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app.get(&format!("/pledges/{pledge_id}/refunds"), Some(&backer)).await;
    assert_eq!(json_body(res).await["data"].as_array().unwrap().len(), 1);

    let res = app.delete(&format!("/campaigns/{id}"), Some(&maker)).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unhandled_webhook_events_are_acknowledged() {
    let app = spawn_app(true).await;
    let event = json!({
        "id": "evt_other",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    });
    let res = app.post_webhook(&event, None).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .client
        .post(format!("{}/webhooks/stripe", app.base_url))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn integrations_without_credentials_answer_503() {
    let app = spawn_app(false).await;
    let (maker, _) = app.sign_in("maker@example.com").await;
    let id = app.live_campaign(&maker, 10_000).await;

    let res = app
        .post(&format!("/campaigns/{id}/checkout"), Some(&maker), json!({ "amount_cents": 5_000 }))
        .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let res = app
        .post("/ai/enhance", Some(&maker), json!({ "content": "Make it pop", "kind": "summary" }))
        .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(res).await["error_data"]["kind"], "unavailable");

    // Refund history lives in the database and stays readable
    let admin = app.sign_in_admin("admin@example.com").await;
    for path in ["/admin/refunds", "/admin/disputes"] {
        let res = app.get(path, Some(&admin)).await;
        assert_eq!(res.status(), StatusCode::OK, "{path}");
        assert!(json_body(res).await["data"].as_array().unwrap().is_empty());
    }
    let res = app
        .get(&format!("/pledges/{}/refunds", Uuid::new_v4()), Some(&maker))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = app
        .post(&format!("/pledges/{}/refunds", Uuid::new_v4()), Some(&maker), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_requests_use_the_validation_envelope() {
    let app = spawn_app(true).await;
    let (maker, _) = app.sign_in("maker@example.com").await;

    let res = app.post("/waitlist", None, json!({})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error_data"]["kind"], "validation");
    assert!(body["error_data"]["fields"]["body"].as_str().unwrap().contains("email"));

    let res = app
        .post(
            "/campaigns",
            Some(&maker),
            json!({ "title": "Harden the prototype", "funding_goal_cents": "lots" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error_data"]["kind"], "validation");

    let res = app
        .request(reqwest::Method::POST, "/waitlist", None)
        .header("Content-Type", "application/json")
        .body("{\"email\":")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error_data"]["fields"]["body"].is_string());

    let res = app.get("/campaigns/not-a-uuid", Some(&maker)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error_data"]["fields"]["path"].is_string());

    let res = app.get("/campaigns?mine=maybe", Some(&maker)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error_data"]["fields"]["query"].is_string());
}

#[tokio::test]
async fn restricted_signups_require_approved_waitlist_entry() {
    let app = spawn_app(true).await;
    let admin = app.sign_in_admin("admin@example.com").await;
    let (user, _) = app.sign_in("user@example.com").await;

    let res = app.get("/admin/settings", Some(&user)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .put("/admin/settings", Some(&admin), json!({ "signups_restricted": true }))
        .await;
    assert_eq!(json_body(res).await["data"]["signups_restricted"], true);

    let res = app
        .post("/auth/request-code", None, json!({ "email": "early@example.com" }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await["error_data"]["kind"], "waitlist");

    // Existing accounts can still sign in
    let res = app
        .post("/auth/request-code", None, json!({ "email": "user@example.com" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .post("/waitlist", None, json!({ "email": "early@example.com", "reason": "beta" }))
        .await;
    let entry_id = json_body(res).await["data"]["id"].as_str().unwrap().to_string();
    let res = app.post("/waitlist", None, json!({ "email": "early@example.com" })).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app.get("/admin/waitlist?status=pending", Some(&admin)).await;
    assert_eq!(json_body(res).await["data"].as_array().unwrap().len(), 1);
    let res = app
        .post(&format!("/admin/waitlist/{entry_id}/approve"), Some(&admin), json!({}))
        .await;
    assert_eq!(json_body(res).await["data"]["status"], "approved");

    app.sign_in("early@example.com").await;
}

#[tokio::test]
async fn admin_console_reports_and_guards_roles() {
    let app = spawn_app(true).await;
    let admin = app.sign_in_admin("admin@example.com").await;
    let (maker, maker_id) = app.sign_in("maker@example.com").await;
    app.live_campaign(&maker, 10_000).await;

    let res = app
        .put("/admin/settings", Some(&admin), json!({ "platform_fee_bps": 5_000 }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.get("/admin/users?limit=1", Some(&admin)).await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["users"].as_array().unwrap().len(), 1);

    let res = app.get("/admin/campaigns?status=live", Some(&admin)).await;
    assert_eq!(json_body(res).await["data"].as_array().unwrap().len(), 1);

    let res = app.get("/admin/stats", Some(&admin)).await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["user_count"], 2);
    assert_eq!(body["data"]["open_disputes"], 0);

    // Promotion applies to the maker's existing token
    let res = app
        .put(&format!("/admin/users/{maker_id}/role"), Some(&admin), json!({ "role": "admin" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(app.get("/admin/stats", Some(&maker)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn marketplace_lists_approved_providers_only() {
    let app = spawn_app(true).await;
    let admin = app.sign_in_admin("admin@example.com").await;
    let (provider, _) = app.sign_in("provider@example.com").await;

    let res = app
        .post("/admin/categories", Some(&admin), json!({ "name": "Security Audits" }))
        .await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["slug"], "security-audits");
    let category_id = body["data"]["id"].as_str().unwrap().to_string();
    let res = app
        .post("/admin/categories", Some(&admin), json!({ "name": "security audits" }))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .post(
            "/organizations",
            Some(&provider),
            json!({ "name": "Audit Co", "kind": "service_provider" }),
        )
        .await;
    let body = json_body(res).await;
    assert_eq!(body["data"]["status"], "pending");
    let org_id = body["data"]["id"].as_str().unwrap().to_string();

    let listing = json!({ "category_id": category_id, "title": "Pen test", "price_cents": 500_000 });
    let res = app
        .post(&format!("/organizations/{org_id}/services"), Some(&provider), listing.clone())
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .post(
            &format!("/admin/organizations/{org_id}/review"),
            Some(&admin),
            json!({ "approved": true }),
        )
        .await;
    assert_eq!(json_body(res).await["data"]["status"], "approved");

    let res = app
        .post(&format!("/organizations/{org_id}/services"), Some(&provider), listing)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.get("/services?category=security-audits", None).await;
    let body = json_body(res).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["organization_name"], "Audit Co");
    let res = app.get("/services?category=unknown", None).await;
    assert_eq!(json_body(res).await["data"], json!([]));

    let res = app.delete(&format!("/admin/categories/{category_id}"), Some(&admin)).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
