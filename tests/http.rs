use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    token: String,
    profile: Profile,
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    referral_code: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    points: i64,
}

#[derive(Debug, Deserialize)]
struct ReferralStats {
    referrals: u32,
    points_earned: i64,
    referral_link: String,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));
static EMAIL_SEQ: AtomicUsize = AtomicUsize::new(0);

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_dir() -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("rewards_hub_http_{}_{}", std::process::id(), nanos));
    path
}

fn unique_email(tag: &str) -> String {
    let seq = EMAIL_SEQ.fetch_add(1, Ordering::SeqCst);
    format!("{tag}{seq}_{}@example.com", std::process::id())
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/health")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let dir = unique_dir();
    let child = Command::new(env!("CARGO_BIN_EXE_rewards_hub"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", dir.join("rewards.json"))
        .env("UPLOADS_DIR", dir.join("uploads"))
        .env("POLL_INTERVAL_SECS", "1")
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn sign_up(client: &Client, base_url: &str, referral_code: Option<&str>) -> SignUpResponse {
    let response = client
        .post(format!("{base_url}/auth/signup"))
        .json(&json!({
            "email": unique_email("user"),
            "password": "correct-horse",
            "referral_code": referral_code,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

async fn balance(client: &Client, base_url: &str, token: &str) -> i64 {
    let body: BalanceResponse = client
        .get(format!("{base_url}/api/points"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body.points
}

async fn read_events_until(response: &mut reqwest::Response, buffer: &mut String, needle: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !buffer.contains(needle) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let chunk = tokio::time::timeout(remaining, response.chunk())
            .await
            .unwrap_or_else(|_| panic!("no {needle:?} in event stream: {buffer:?}"))
            .unwrap()
            .expect("event stream closed");
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
}

#[tokio::test]
async fn http_requires_bearer_token() {
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .get(format!("{}/api/points", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{}/api/points", server.base_url))
        .bearer_auth("not-a-session")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn http_referral_signup_credits_referrer() {
    let server = shared_server().await;
    let client = Client::new();

    let referrer = sign_up(&client, &server.base_url, None).await;
    let newcomer = sign_up(
        &client,
        &server.base_url,
        Some(referrer.profile.referral_code.as_str()),
    )
    .await;

    let stats: ReferralStats = client
        .get(format!("{}/api/referrals", server.base_url))
        .bearer_auth(&referrer.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats.referrals, 1);
    assert_eq!(stats.points_earned, 25);
    assert!(stats
        .referral_link
        .ends_with(&format!("/signup?ref={}", referrer.profile.referral_code)));
    assert_eq!(balance(&client, &server.base_url, &newcomer.token).await, 0);
    assert_ne!(newcomer.profile.id, referrer.profile.id);
}

#[tokio::test]
async fn http_daily_claim_is_once_per_day() {
    let server = shared_server().await;
    let client = Client::new();
    let user = sign_up(&client, &server.base_url, None).await;

    let first: Value = client
        .post(format!("{}/api/streak/claim", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["outcome"], "claimed");
    assert_eq!(first["streak_count"], 1);
    assert_eq!(first["points_awarded"], 5);

    let second: Value = client
        .post(format!("{}/api/streak/claim", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["outcome"], "already_claimed");

    let streak: Value = client
        .get(format!("{}/api/streak", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(streak["claimed_today"], true);
    assert_eq!(streak["streak_count"], 1);
    assert_eq!(streak["week"].as_array().map(Vec::len), Some(7));

    assert_eq!(balance(&client, &server.base_url, &user.token).await, 5);
}

#[tokio::test]
async fn http_redeem_without_points_is_rejected() {
    let server = shared_server().await;
    let client = Client::new();
    let user = sign_up(&client, &server.base_url, None).await;

    let catalog: Value = client
        .get(format!("{}/api/rewards?status=locked", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let reward_id = catalog["rewards"][0]["id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/api/rewards/{reward_id}/redeem", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["outcome"], "insufficient_points");
    assert_eq!(outcome["balance"], 0);

    let log: Vec<Value> = client
        .get(format!("{}/api/redemptions", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(log.is_empty());
}

#[tokio::test]
async fn http_offer_claim_stores_screenshot() {
    let server = shared_server().await;
    let client = Client::new();
    let user = sign_up(&client, &server.base_url, None).await;

    let response = client
        .post(format!(
            "{}/api/claims?email=me@example.com&file_name=proof.png",
            server.base_url
        ))
        .bearer_auth(&user.token)
        .body(vec![0x89, b'P', b'N', b'G'])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let claim: Value = response.json().await.unwrap();
    assert_eq!(claim["status"], "pending");
    assert!(claim["screenshot_path"]
        .as_str()
        .unwrap()
        .starts_with("reclaim-screenshots/"));

    let response = client
        .post(format!("{}/api/claims?file_name=proof.png", server.base_url))
        .bearer_auth(&user.token)
        .body(vec![1, 2, 3])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_sign_out_invalidates_token() {
    let server = shared_server().await;
    let client = Client::new();
    let user = sign_up(&client, &server.base_url, None).await;

    let refreshed: Value = client
        .post(format!("{}/auth/refresh", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = refreshed["token"].as_str().unwrap().to_string();
    assert_ne!(token, user.token);

    let response = client
        .post(format!("{}/auth/signout", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/api/points", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn http_points_events_follow_balance() {
    let server = shared_server().await;
    let client = Client::new();
    let user = sign_up(&client, &server.base_url, None).await;

    let mut events = client
        .get(format!("{}/api/points/events", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap();
    assert_eq!(events.status(), StatusCode::OK);
    assert!(events
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream")));

    let mut buffer = String::new();
    read_events_until(&mut events, &mut buffer, "event: balance\ndata: 0\n").await;

    let response = client
        .post(format!("{}/api/streak/claim", server.base_url))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    read_events_until(&mut events, &mut buffer, "event: balance\ndata: 5\n").await;
}

#[tokio::test]
async fn http_password_reset_is_accepted() {
    let server = shared_server().await;
    let client = Client::new();
    let email = unique_email("reset");

    let response = client
        .post(format!("{}/auth/signup", server.base_url))
        .json(&json!({ "email": email, "password": "correct-horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for target in [email.as_str(), "nobody@example.com"] {
        let response = client
            .post(format!("{}/auth/password-reset", server.base_url))
            .json(&json!({ "email": target }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = client
        .post(format!("{}/auth/password-reset", server.base_url))
        .json(&json!({ "email": "not-an-email" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
