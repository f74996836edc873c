use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use courier_hierarchy::api::rest::{router, ACTOR_HEADER};
use courier_hierarchy::config::EngineSettings;
use courier_hierarchy::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> (axum::Router, mpsc::Receiver<Uuid>) {
    let (state, rx) = AppState::new(EngineSettings::default(), 1024, 1024);
    (router(Arc::new(state)), rx)
}

fn json_request(method: &str, uri: &str, actor: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn create_root(app: &axum::Router, city_code: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/roots",
            None,
            json!({ "user_id": Uuid::new_v4(), "name": "city lead", "city_code": city_code }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn hire(app: &axum::Router, manager: &str, level: u8, zone_code: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/workers",
            Some(manager),
            json!({
                "user_id": Uuid::new_v4(),
                "name": format!("worker {zone_code}"),
                "level": level,
                "zone_code": zone_code,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_task(app: &axum::Router, zone_code: &str, reward: i64) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/tasks",
            None,
            json!({
                "content_ref": "letter-42",
                "pickup": { "zone_code": zone_code },
                "delivery": { "zone_code": zone_code, "description": "front desk" },
                "priority": "normal",
                "reward": reward,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_str().unwrap().to_string()
}

/// City SCH -> school SCH01 -> area SCH01-A2 -> courier SCH01-A2-B01.
async fn chain(app: &axum::Router) -> (String, String, String, String) {
    let city = create_root(app, "SCH").await;
    let school = hire(app, &city, 3, "SCH01").await;
    let area = hire(app, &school, 2, "SCH01-A2").await;
    let courier = hire(app, &area, 1, "SCH01-A2-B01").await;
    (city, school, area, courier)
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["workers"], 0);
    assert_eq!(body["tasks"], 0);
    assert_eq!(body["assignments"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("badges_awarded_total"));
    assert!(body.contains("notification_failures_total"));
}

#[tokio::test]
async fn create_subordinate_flow() {
    let (app, _rx) = setup();
    let city = create_root(&app, "SCH").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/workers",
            Some(&city),
            json!({ "user_id": Uuid::new_v4(), "name": "school lead", "level": 3, "zone_code": "SCH01" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["level"], 3);
    assert_eq!(body["zone_type"], "school");
    assert_eq!(body["status"], "approved");
    assert_eq!(body["parent_id"], city.as_str());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/workers",
            Some(&city),
            json!({ "user_id": Uuid::new_v4(), "name": "skipper", "level": 2, "zone_code": "SCH01-A1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/workers",
            None,
            json!({ "user_id": Uuid::new_v4(), "name": "anon", "level": 3, "zone_code": "SCH02" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/workers",
            Some(&city),
            json!({ "user_id": Uuid::new_v4(), "name": "far away", "level": 3, "zone_code": "BJ01" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["rule"], "zone_outside_scope");
}

#[tokio::test]
async fn permission_scope_reflects_level() {
    let (app, _rx) = setup();
    let (_, school, _, courier) = chain(&app).await;

    let (status, body) = send(&app, get_request(&format!("/workers/{school}/scope"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignable_zone_ids"], json!(["SCH01"]));
    assert!(body["capabilities"]
        .as_array()
        .unwrap()
        .contains(&json!("batch_assign")));

    let (_, body) = send(&app, get_request(&format!("/workers/{courier}/scope"))).await;
    assert_eq!(body["manageable_zone_ids"], json!([]));
}

#[tokio::test]
async fn zone_already_claimed_is_a_conflict() {
    let (app, _rx) = setup();
    let city = create_root(&app, "SCH").await;
    let school = hire(&app, &city, 3, "SCH01").await;
    let first = hire(&app, &school, 2, "SCH01-A1").await;
    let second = hire(&app, &school, 2, "SCH01-A3").await;

    let assign = |worker: &str| {
        json_request(
            "POST",
            "/zone-assignments",
            Some(&school),
            json!({ "worker_id": worker, "zone_type": "area", "zone_id": "SCH01-A2" }),
        )
    };

    let (status, _) = send(&app, assign(&first)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, assign(&second)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "state_conflict");

    let (_, body) = send(&app, get_request(&format!("/zone-assignments?worker_id={first}"))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cascade_without_eligible_child_falls_short_where_auto_hierarchy_succeeds() {
    let (app, _rx) = setup();
    let (_, school, _, courier) = chain(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/zone-assignments",
            Some(&school),
            json!({ "worker_id": courier, "zone_type": "building", "zone_id": "SCH01-A5-B01" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let task = create_task(&app, "SCH01-A5-B01", 5).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/tasks/{task}/assign"),
            Some(&school),
            json!({ "strategy": "cascade" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "insufficient_resource");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/tasks/{task}/assign"),
            Some(&school),
            json!({ "strategy": "auto_hierarchy" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["task"]["courier_id"], courier.as_str());
    assert_eq!(body["task"]["status"], "accepted");
    assert_eq!(body["history"]["assignment_type"], "auto_hierarchy");
    assert!(body["task"]["deadline"].is_string());

    let (_, body) = send(&app, get_request(&format!("/assignments?task_id={task}"))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_reassign_leaves_task_with_original_courier() {
    let (app, _rx) = setup();
    let (city, _, area, courier_a) = chain(&app).await;
    let other_school = hire(&app, &city, 3, "SCH02").await;
    let other_area = hire(&app, &other_school, 2, "SCH02-A1").await;
    let courier_b = hire(&app, &other_area, 1, "SCH02-A1-B01").await;

    let task = create_task(&app, "SCH01-A2-B01", 5).await;
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/tasks/{task}/assign"),
            Some(&area),
            json!({ "strategy": "direct", "worker_id": courier_a }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/tasks/{task}/reassign"),
            Some(&area),
            json!({ "worker_id": courier_b, "reason": "rebalance" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "permission_denied");

    let (_, body) = send(&app, get_request(&format!("/tasks/{task}"))).await;
    assert_eq!(body["courier_id"], courier_a.as_str());

    let (_, body) = send(&app, get_request(&format!("/audit?actor_id={area}&outcome=denied"))).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "reassign_task");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignments_have_exactly_one_winner() {
    let (app, _rx) = setup();
    let (_, _, area, courier) = chain(&app).await;
    let task = create_task(&app, "SCH01-A2-B01", 5).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            let request = json_request(
                "POST",
                &format!("/tasks/{task}/assign"),
                Some(&area),
                json!({ "strategy": "direct", "worker_id": courier }),
            );
            tokio::spawn(async move { send(&app, request).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == StatusCode::OK {
            winners += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(body["kind"], "state_conflict");
            assert_eq!(body["retryable"], true);
        }
    }
    assert_eq!(winners, 1);

    let (_, body) = send(&app, get_request(&format!("/assignments?task_id={task}"))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delivery_pays_reward_and_balance_never_goes_negative() {
    let (app, mut rx) = setup();
    let (_, _, _, courier) = chain(&app).await;
    let task = create_task(&app, "SCH01-A2-B01", 5).await;

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/tasks/{task}/accept"), Some(&courier), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/tasks/{task}/status"),
            Some(&courier),
            json!({ "status": "delivered" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid transition from accepted to delivered");

    for next in ["collected", "in_transit", "delivered"] {
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                &format!("/tasks/{task}/status"),
                Some(&courier),
                json!({ "status": next }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    assert_eq!(rx.recv().await.unwrap().to_string(), courier);

    let (_, body) = send(&app, get_request(&format!("/workers/{courier}/points"))).await;
    assert_eq!(body["earned"], 5);
    assert_eq!(body["used"], 0);

    let spend = |amount: i64| {
        json_request(
            "POST",
            "/points/spend",
            Some(&courier),
            json!({ "amount": amount, "reason": "gift shop" }),
        )
    };
    let (status, body) = send(&app, spend(6)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "insufficient_resource");

    let (status, _) = send(&app, spend(5)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get_request(&format!("/workers/{courier}"))).await;
    assert_eq!(body["points"], 0);

    let (_, body) = send(&app, get_request(&format!("/workers/{courier}/points/transactions"))).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn badge_check_is_idempotent() {
    let (app, _rx) = setup();
    let (_, school, _, _) = chain(&app).await;

    let check = || json_request("POST", &format!("/workers/{school}/badges/check"), None, json!({}));

    let (status, first) = send(&app, check()).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = first
        .as_array()
        .unwrap()
        .iter()
        .map(|earned| earned["badge_code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["area_lead"]);

    let (_, points_before) = send(&app, get_request(&format!("/workers/{school}/points"))).await;

    let (status, second) = send(&app, check()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, json!([]));

    let (_, points_after) = send(&app, get_request(&format!("/workers/{school}/points"))).await;
    assert_eq!(points_before, points_after);
    assert_eq!(points_after["earned"], 30);
}

#[tokio::test]
async fn upgrade_request_review_flow() {
    let (app, _rx) = setup();
    let (_, school, _, courier) = chain(&app).await;

    let (status, body) = send(
        &app,
        get_request(&format!("/workers/{courier}/eligibility?target_level=2")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["can_upgrade"], false);
    assert_eq!(body["requirements"][0]["type"], "completed_tasks");

    let submit = || {
        json_request(
            "POST",
            "/upgrade-requests",
            Some(&courier),
            json!({ "requested_level": 2, "reason": "covering extra buildings" }),
        )
    };
    let (status, request) = send(&app, submit()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["status"], "pending");

    let (status, body) = send(&app, submit()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_exists");

    let request_id = request["id"].as_str().unwrap();
    let review = |body: Value| {
        json_request(
            "POST",
            &format!("/upgrade-requests/{request_id}/review"),
            Some(&school),
            body,
        )
    };

    // SCH01-A2 is still held by the courier's area lead.
    let (status, body) = send(&app, review(json!({ "action": "approve" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "state_conflict");

    let approve = json!({ "action": "approve", "comment": "well earned", "zone_code": "SCH01-A4" });
    let (status, body) = send(&app, review(approve.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "approved");

    let (_, worker) = send(&app, get_request(&format!("/workers/{courier}"))).await;
    assert_eq!(worker["level"], 2);
    assert_eq!(worker["zone_type"], "area");
    assert_eq!(worker["zone_code"], "SCH01-A4");
    assert_eq!(worker["parent_id"], school.as_str());

    let (status, _) = send(&app, review(approve)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn roots_cannot_be_minted_once_seeded() {
    let (app, _rx) = setup();
    let (city, _, _, courier) = chain(&app).await;

    for city_code in ["SCH", "BJ"] {
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/roots",
                None,
                json!({ "user_id": Uuid::new_v4(), "name": "intruder", "city_code": city_code }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{city_code}");
        assert_eq!(body["rule"], "bootstrap_closed");
    }

    let (_, body) = send(&app, get_request("/workers")).await;
    assert_eq!(body.as_array().unwrap().len(), 4);

    let (_, body) = send(&app, get_request(&format!("/workers/{city}"))).await;
    assert_eq!(body["zone_code"], "SCH");
    let (_, body) = send(&app, get_request(&format!("/workers/{courier}/scope"))).await;
    assert_eq!(body["manageable_zone_ids"], json!([]));
}

#[tokio::test]
async fn a_held_zone_cannot_be_hired_into_or_assigned() {
    let (app, _rx) = setup();
    let (_, school, _, _) = chain(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/workers",
            Some(&school),
            json!({
                "user_id": Uuid::new_v4(),
                "name": "second lead",
                "level": 2,
                "zone_code": "SCH01-A2",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "state_conflict");

    let other = hire(&app, &school, 2, "SCH01-A5").await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/zone-assignments",
            Some(&school),
            json!({ "worker_id": other, "zone_type": "area", "zone_id": "SCH01-A2" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "state_conflict");

    let (_, body) = send(&app, get_request(&format!("/zone-assignments?worker_id={other}"))).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn ratings_come_from_someone_other_than_the_courier() {
    let (app, _rx) = setup();
    let (_, _, area, courier) = chain(&app).await;
    let task = create_task(&app, "SCH01-A2-B01", 0).await;

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/tasks/{task}/accept"), Some(&courier), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    for next in ["collected", "in_transit", "delivered"] {
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                &format!("/tasks/{task}/status"),
                Some(&courier),
                json!({ "status": next }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let rate = |actor: Option<&str>| {
        json_request("POST", &format!("/tasks/{task}/rating"), actor, json!({ "stars": 5 }))
    };

    let (status, body) = send(&app, rate(None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, body) = send(&app, rate(Some(&courier))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["rule"], "self_rating");

    let (status, body) = send(&app, rate(Some(&area))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["rating"], 5);
    assert_eq!(body["rated_by"], area.as_str());

    let (status, _) = send(&app, rate(Some(&area))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
