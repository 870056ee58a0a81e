use axum::http::StatusCode;
use gymledger_server::{server, storage};
use gymledger_shared::api::{IDEMPOTENCY_KEY_HEADER, endpoints};
use gymledger_shared::domain::{ActivityType, Badge, Member, Quest, Reward};
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

const STAFF_PWD: &str = "coachpass";
const MEMBER_PWD: &str = "liftheavy";

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                &endpoints::auth_login(&self.base),
                None,
                Some(json!({"username": username, "password": password})),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body:?}");
        body.get("token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut req = match method {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn expect(
        &self,
        method: &str,
        url: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.send(method, url, token, body, &[]).await;
        assert_eq!(
            status, expected,
            "{method} {url} returned {status:?} with body {value:?}",
        );
        value
    }

    async fn balance(&self, token: &str) -> i64 {
        self.expect(
            "GET",
            &endpoints::my_points(&self.base),
            Some(token),
            None,
            StatusCode::OK,
        )
        .await["total_points"]
            .as_i64()
            .unwrap()
    }

    async fn grant(&self, staff: &str, member_id: i32, points: i64) {
        self.expect(
            "POST",
            &endpoints::member_points(&self.base, member_id),
            Some(staff),
            Some(json!({"points": points, "description": "test grant"})),
            StatusCode::CREATED,
        )
        .await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    // Minimum cost keeps login fast in tests
    let staff_hash = bcrypt::hash(STAFF_PWD, 4).unwrap();
    let member_hash = bcrypt::hash(MEMBER_PWD, 4).unwrap();
    let config = server::AppConfig {
        jwt_secret: "testsecret".into(),
        users: vec![
            server::UserConfig {
                username: "coach".into(),
                password_hash: staff_hash,
                role: server::Role::Staff,
                member_id: None,
            },
            server::UserConfig {
                username: "alice".into(),
                password_hash: member_hash.clone(),
                role: server::Role::Member,
                member_id: Some(1),
            },
            server::UserConfig {
                username: "bob".into(),
                password_hash: member_hash,
                role: server::Role::Member,
                member_id: Some(2),
            },
        ],
        members: vec![
            Member {
                id: 1,
                name: "Alice".into(),
            },
            Member {
                id: 2,
                name: "Bob".into(),
            },
        ],
        quests: vec![
            Quest {
                id: 1,
                name: "Three workouts".into(),
                quest_type: ActivityType::Exercise,
                target_value: 3,
                points_reward: 100,
                description: None,
            },
            Quest {
                id: 2,
                name: "First visit".into(),
                quest_type: ActivityType::Attendance,
                target_value: 1,
                points_reward: 20,
                description: Some("Check in once".into()),
            },
            Quest {
                id: 3,
                name: "Two meals".into(),
                quest_type: ActivityType::Diet,
                target_value: 2,
                points_reward: 30,
                description: None,
            },
        ],
        rewards: vec![
            Reward {
                id: 1,
                name: "Protein shake".into(),
                required_points: 150,
                stock_quantity: 5,
                category: Some("drinks".into()),
            },
            Reward {
                id: 2,
                name: "Gym towel".into(),
                required_points: 50,
                stock_quantity: 0,
                category: Some("gear".into()),
            },
        ],
        badges: vec![Badge {
            id: 1,
            name: "Early bird".into(),
            description: None,
        }],
        timezone: "Europe/Warsaw".into(),
        attendance_bonus: 50,
        dev_cors_origin: None,
        listen_port: None,
    };
    config.validate().expect("valid config");

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");
    store
        .seed_from_config(
            &config.members,
            &config.quests,
            &config.rewards,
            &config.badges,
        )
        .await
        .expect("seed");

    let state = server::AppState::new(config, store);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

#[tokio::test]
async fn public_endpoints_work() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    server
        .expect(
            "GET",
            &format!("{}/healthz", server.base),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    let token = server.login("coach", STAFF_PWD).await;
    assert!(!token.is_empty());

    let (status, body) = server
        .send(
            "POST",
            &endpoints::auth_login(&server.base),
            None,
            Some(json!({"username": "alice", "password": "wrong"})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let cases: Vec<(&str, String)> = vec![
        ("GET", endpoints::quests(b)),
        ("GET", endpoints::rewards(b)),
        ("GET", endpoints::my_points(b)),
        ("GET", endpoints::my_ledger(b)),
        ("POST", endpoints::my_check_in(b)),
        ("POST", endpoints::my_exercises(b)),
        ("POST", endpoints::my_redeem(b, 1)),
        ("POST", endpoints::member_points(b, 1)),
        ("POST", endpoints::admin_rewards(b)),
    ];
    for (method, url) in cases {
        server
            .expect(method, &url, None, None, StatusCode::UNAUTHORIZED)
            .await;
    }

    let (status, _) = server
        .send("GET", &endpoints::my_points(b), Some("not-a-jwt"), None, &[])
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_are_confined_to_their_routes() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let staff = server.login("coach", STAFF_PWD).await;
    let alice = server.login("alice", MEMBER_PWD).await;

    // Members cannot move points or stock
    for url in [
        endpoints::member_points(b, 1),
        endpoints::admin_rewards(b),
        endpoints::reward_restock(b, 1),
    ] {
        server
            .expect(
                "POST",
                &url,
                Some(&alice),
                Some(json!({"points": 1000, "quantity": 1})),
                StatusCode::FORBIDDEN,
            )
            .await;
    }
    // Staff have no member identity to act as
    server
        .expect(
            "POST",
            &endpoints::my_check_in(b),
            Some(&staff),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;

    // Both read the catalog
    for token in [&staff, &alice] {
        let quests = server
            .expect(
                "GET",
                &endpoints::quests(b),
                Some(token),
                None,
                StatusCode::OK,
            )
            .await;
        assert_eq!(quests.as_array().unwrap().len(), 3);
        let badges = server
            .expect(
                "GET",
                &endpoints::badges(b),
                Some(token),
                None,
                StatusCode::OK,
            )
            .await;
        assert_eq!(badges[0]["name"], "Early bird");
    }
}

#[tokio::test]
async fn exercise_quest_pays_out_once() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let alice = server.login("alice", MEMBER_PWD).await;

    let mut responses = Vec::new();
    for i in 0..3 {
        let resp = server
            .expect(
                "POST",
                &endpoints::my_exercises(b),
                Some(&alice),
                Some(json!({
                    "exercise_name": "bench press",
                    "duration_minutes": 30 + i,
                    "performed_at": "2025-10-06T18:30:00+02:00"
                })),
                StatusCode::CREATED,
            )
            .await;
        responses.push(resp);
    }
    assert_eq!(responses[0]["points_earned"], 0);
    let last = &responses[2];
    assert_eq!(last["points_earned"], 100);
    assert_eq!(last["completed_quests"][0]["id"], 1);
    assert_eq!(last["total_points"], 100);

    let fourth = server
        .expect(
            "POST",
            &endpoints::my_exercises(b),
            Some(&alice),
            Some(json!({"exercise_name": "bench press"})),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(fourth["points_earned"], 0);
    assert!(fourth["completed_quests"].as_array().unwrap().is_empty());
    assert_eq!(server.balance(&alice).await, 100);

    let completed = server
        .expect(
            "GET",
            &endpoints::my_quests_filtered(b, Some("exercise"), Some("completed")),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    let completed = completed.as_array().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["current_progress"], 3);
    assert!(completed[0]["completed_at"].is_string());

    let available = server
        .expect(
            "GET",
            &endpoints::my_quests_filtered(b, None, Some("available")),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(
        available
            .as_array()
            .unwrap()
            .iter()
            .all(|q| q["id"] != 1)
    );

    let ledger = server
        .expect(
            "GET",
            &endpoints::my_ledger(b),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    let ledger = ledger.as_array().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0]["source"], "QUEST_COMPLETION");
    assert_eq!(ledger[0]["balance_after"], 100);

    let (status, body) = server
        .send(
            "POST",
            &endpoints::my_exercises(b),
            Some(&alice),
            Some(json!({"exercise_name": "run", "performed_at": "yesterday"})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn double_check_in_is_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let alice = server.login("alice", MEMBER_PWD).await;

    let first = server
        .expect(
            "POST",
            &endpoints::my_check_in(b),
            Some(&alice),
            None,
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(first["bonus_points"], 50);
    assert_eq!(first["points_earned"], 70);
    assert_eq!(first["completed_quests"][0]["name"], "First visit");
    assert_eq!(first["total_points"], 70);

    let (status, body) = server
        .send("POST", &endpoints::my_check_in(b), Some(&alice), None, &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "already_checked_in");
    assert_eq!(body["retryable"], false);
    assert_eq!(server.balance(&alice).await, 70);

    let history = server
        .expect(
            "GET",
            &endpoints::my_attendance(b),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let today = history[0]["attended_on"].as_str().unwrap();
    let on_day = server
        .expect(
            "GET",
            &endpoints::my_attendance_on(b, today),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(on_day[0]["id"], history[0]["id"]);
    let (status, body) = server
        .send(
            "GET",
            &endpoints::my_attendance_on(b, "06/10/2025"),
            Some(&alice),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn failed_redemption_keeps_stock_and_balance() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let staff = server.login("coach", STAFF_PWD).await;
    let alice = server.login("alice", MEMBER_PWD).await;
    server.grant(&staff, 1, 100).await;

    let (status, body) = server
        .send("POST", &endpoints::my_redeem(b, 1), Some(&alice), None, &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "insufficient_balance");

    let reward = server
        .expect(
            "GET",
            &endpoints::reward(b, 1),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(reward["stock_quantity"], 5);
    assert_eq!(server.balance(&alice).await, 100);

    let exchanges = server
        .expect(
            "GET",
            &endpoints::my_exchanges(b),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(exchanges.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn redemption_and_stock_lifecycle() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let staff = server.login("coach", STAFF_PWD).await;
    let bob = server.login("bob", MEMBER_PWD).await;
    server.grant(&staff, 2, 200).await;

    let redeemed = server
        .expect(
            "POST",
            &endpoints::my_redeem(b, 1),
            Some(&bob),
            None,
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(redeemed["reward_name"], "Protein shake");
    assert_eq!(redeemed["used_points"], 150);
    assert_eq!(redeemed["total_points"], 50);

    let (status, body) = server
        .send("POST", &endpoints::my_redeem(b, 2), Some(&bob), None, &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "out_of_stock");

    let restocked = server
        .expect(
            "POST",
            &endpoints::reward_restock(b, 2),
            Some(&staff),
            Some(json!({"quantity": 2})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(restocked["stock_quantity"], 2);
    let towel = server
        .expect(
            "POST",
            &endpoints::my_redeem(b, 2),
            Some(&bob),
            None,
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(towel["total_points"], 0);

    server
        .expect(
            "POST",
            &endpoints::my_redeem(b, 99),
            Some(&bob),
            None,
            StatusCode::NOT_FOUND,
        )
        .await;

    let history = server
        .expect(
            "GET",
            &endpoints::my_exchanges(b),
            Some(&bob),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(history.as_array().unwrap().len(), 2);

    let created = server
        .expect(
            "POST",
            &endpoints::admin_rewards(b),
            Some(&staff),
            Some(json!({"name": "Locker", "required_points": 500, "stock_quantity": 1})),
            StatusCode::CREATED,
        )
        .await;
    assert!(created["id"].as_i64().unwrap() > 2);
    let (status, body) = server
        .send(
            "POST",
            &endpoints::admin_rewards(b),
            Some(&staff),
            Some(json!({"name": "Broken", "required_points": -1, "stock_quantity": 1})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let alice = server.login("alice", MEMBER_PWD).await;
    let coach = server.login("coach", STAFF_PWD).await;

    let (status, body) = server
        .send(
            "POST",
            &endpoints::my_exercises(b),
            Some(&alice),
            Some(json!({"duration_minutes": 5})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["retryable"], false);
    assert!(body["error"].as_str().unwrap().contains("exercise_name"));

    let (status, body) = server
        .send(
            "POST",
            &endpoints::member_points(b, 1),
            Some(&coach),
            Some(json!({"points": "lots"})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, body) = server
        .send(
            "GET",
            &endpoints::my_quests_filtered(b, None, Some("abandoned")),
            Some(&alice),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    // A grant that would overflow the balance is refused and changes nothing
    server.grant(&coach, 1, i64::MAX).await;
    let (status, body) = server
        .send(
            "POST",
            &endpoints::member_points(b, 1),
            Some(&coach),
            Some(json!({"points": 1})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert_eq!(server.balance(&alice).await, i64::MAX);
}

#[tokio::test]
async fn retried_activity_with_same_key_is_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let alice = server.login("alice", MEMBER_PWD).await;
    let meal = json!({"food_name": "oatmeal", "meal_type": "breakfast"});

    let (status, _) = server
        .send(
            "POST",
            &endpoints::my_diet(b),
            Some(&alice),
            Some(meal.clone()),
            &[(IDEMPOTENCY_KEY_HEADER, "meal-1")],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server
        .send(
            "POST",
            &endpoints::my_diet(b),
            Some(&alice),
            Some(meal.clone()),
            &[(IDEMPOTENCY_KEY_HEADER, "meal-1")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "duplicate_activity");

    // The retry did not advance the two-meal quest
    let (_, second) = server
        .send(
            "POST",
            &endpoints::my_diet(b),
            Some(&alice),
            Some(meal),
            &[(IDEMPOTENCY_KEY_HEADER, "meal-2")],
        )
        .await;
    assert_eq!(second["points_earned"], 30);
    assert_eq!(server.balance(&alice).await, 30);
}

#[tokio::test]
async fn goals_and_posts_feed_quests() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let alice = server.login("alice", MEMBER_PWD).await;
    let bob = server.login("bob", MEMBER_PWD).await;

    let goal = server
        .expect(
            "POST",
            &endpoints::my_goals(b),
            Some(&alice),
            Some(json!({"item_name": "Plank 3 minutes", "target_date": "2025-12-31"})),
            StatusCode::CREATED,
        )
        .await;
    let goal_id = goal["id"].as_i64().unwrap() as i32;
    assert_eq!(goal["is_achieved"], false);

    server
        .expect(
            "POST",
            &endpoints::my_goal_achieve(b, goal_id),
            Some(&bob),
            None,
            StatusCode::NOT_FOUND,
        )
        .await;
    let achieved = server
        .expect(
            "POST",
            &endpoints::my_goal_achieve(b, goal_id),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(achieved["record_id"], goal_id);

    let post = server
        .expect(
            "POST",
            &endpoints::my_posts(b),
            Some(&bob),
            Some(json!({"kind": "mentee", "title": "Need a squat coach"})),
            StatusCode::CREATED,
        )
        .await;
    assert!(post["record_id"].as_i64().unwrap() > 0);

    server
        .expect(
            "POST",
            &endpoints::my_goals(b),
            Some(&alice),
            Some(json!({"item_name": "Row 2k", "target_date": "31/12/2025"})),
            StatusCode::BAD_REQUEST,
        )
        .await;
}

#[tokio::test]
async fn staff_award_badges_once() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let b = &server.base;
    let staff = server.login("coach", STAFF_PWD).await;
    let alice = server.login("alice", MEMBER_PWD).await;

    let awarded = server
        .expect(
            "POST",
            &endpoints::member_badges(b, 1),
            Some(&staff),
            Some(json!({"badge_id": 1})),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(awarded["name"], "Early bird");

    let (status, body) = server
        .send(
            "POST",
            &endpoints::member_badges(b, 1),
            Some(&staff),
            Some(json!({"badge_id": 1})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "already_awarded");

    server
        .expect(
            "POST",
            &endpoints::member_badges(b, 42),
            Some(&staff),
            Some(json!({"badge_id": 1})),
            StatusCode::NOT_FOUND,
        )
        .await;

    let mine = server
        .expect(
            "GET",
            &endpoints::my_badges(b),
            Some(&alice),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let balance = server
        .expect(
            "GET",
            &endpoints::member_points(b, 1),
            Some(&staff),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(balance["total_points"], 0);
}
