use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use freight_bidding::api::rest::router;
use freight_bidding::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> axum::Router {
    setup_with(true)
}

fn setup_with(storage_transactions: bool) -> axum::Router {
    let state = AppState::in_memory(storage_transactions, 1024, 2.0);
    router(Arc::new(state))
}

#[derive(Clone, Copy)]
struct Caller {
    id: Uuid,
    role: &'static str,
}

impl Caller {
    fn new(role: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
        }
    }
}

fn request(method: &str, uri: &str, caller: Option<Caller>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder
            .header("x-actor-id", caller.id.to_string())
            .header("x-actor-role", caller.role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn shipment_payload() -> Value {
    json!({
        "origin": {
            "address": "Hafenstrasse 1, Hamburg",
            "coordinates": { "lat": 53.5461, "lng": 9.9661 },
            "country_code": "DE"
        },
        "destination": {
            "address": "ul. Portowa 3, Gdansk",
            "coordinates": { "lat": 54.3520, "lng": 18.6466 },
            "country_code": "PL"
        },
        "cargo": { "description": "steel coils", "weight_kg": 12000.0 }
    })
}

struct Carrier {
    owner: Caller,
    truck_id: String,
    driver: Caller,
}

async fn register_carrier(app: &axum::Router) -> Carrier {
    let owner = Caller::new("TRUCK_OWNER");

    let (status, truck) = send(
        app,
        request(
            "POST",
            "/fleet/trucks",
            Some(owner),
            Some(json!({ "plate_number": "HH-AB-1234", "capacity_kg": 24000.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let driver = Caller::new("DRIVER");
    let (status, _) = send(
        app,
        request(
            "POST",
            "/fleet/users",
            Some(owner),
            Some(json!({
                "id": driver.id,
                "name": "Piotr",
                "role": "DRIVER",
                "employer_id": owner.id
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    Carrier {
        owner,
        truck_id: truck["id"].as_str().unwrap().to_string(),
        driver,
    }
}

async fn create_shipment(app: &axum::Router, merchant: Caller) -> String {
    let (status, shipment) = send(
        app,
        request("POST", "/shipments", Some(merchant), Some(shipment_payload())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(shipment["status"], "REQUESTED");
    shipment["id"].as_str().unwrap().to_string()
}

async fn bid(app: &axum::Router, shipment_id: &str, carrier: &Carrier, price: f64) -> (StatusCode, Value) {
    send(
        app,
        request(
            "POST",
            &format!("/shipments/{shipment_id}/applications"),
            Some(carrier.owner),
            Some(json!({
                "truck_id": carrier.truck_id,
                "driver_id": carrier.driver.id,
                "bid": { "price": price, "currency": "EUR" }
            })),
        ),
    )
    .await
}

async fn place_bid(app: &axum::Router, shipment_id: &str, carrier: &Carrier, price: f64) -> String {
    let (status, application) = bid(app, shipment_id, carrier, price).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(application["status"], "PENDING");
    application["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["shipments"], 0);
    assert_eq!(body["acceptance_strategy"], "atomic");
    assert_eq!(body["pending_reconciliation"], 0);
}

#[tokio::test]
async fn health_reports_best_effort_without_transactions() {
    let app = setup_with(false);
    let (_, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(body["acceptance_strategy"], "best_effort");
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("reconciliation_required_total"));
}

#[tokio::test]
async fn requests_without_actor_headers_return_401() {
    let app = setup();

    let (status, body) = send(&app, request("POST", "/shipments", None, Some(shipment_payload()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");

    let bogus = Caller {
        id: Uuid::new_v4(),
        role: "DISPATCHER",
    };
    let (status, _) = send(&app, request("GET", "/shipments", Some(bogus), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn truck_owner_cannot_create_shipments() {
    let app = setup();
    let owner = Caller::new("TRUCK_OWNER");

    let (status, body) = send(&app, request("POST", "/shipments", Some(owner), Some(shipment_payload()))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");
}

#[tokio::test]
async fn get_nonexistent_shipment_returns_404() {
    let app = setup();
    let admin = Caller::new("ADMIN");
    let fake_id = "00000000-0000-0000-0000-000000000000";

    let (status, _) = send(&app, request("GET", &format!("/shipments/{fake_id}"), Some(admin), None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn accepting_one_bid_rejects_competitors_and_confirms_shipment() {
    let app = setup();
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;

    let first = register_carrier(&app).await;
    let second = register_carrier(&app).await;
    let third = register_carrier(&app).await;
    let a1 = place_bid(&app, &shipment_id, &first, 900.0).await;
    let a2 = place_bid(&app, &shipment_id, &second, 850.0).await;
    let a3 = place_bid(&app, &shipment_id, &third, 990.0).await;

    let (status, body) = send(
        &app,
        request("PATCH", &format!("/applications/{a2}/accept"), Some(merchant), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["application"]["status"], "ACCEPTED");
    assert_eq!(body["shipment"]["status"], "CONFIRMED");
    assert_eq!(body["shipment"]["selected_application_id"], a2.as_str());
    let rejected = body["rejected_application_ids"].as_array().unwrap();
    assert_eq!(rejected.len(), 2);
    assert!(rejected.contains(&json!(a1)));
    assert!(rejected.contains(&json!(a3)));

    let (_, application) = send(&app, request("GET", &format!("/applications/{a1}"), Some(first.owner), None)).await;
    assert_eq!(application["status"], "REJECTED");

    let (status, body) = send(
        &app,
        request("PATCH", &format!("/applications/{a1}/accept"), Some(merchant), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (_, trucks) = send(&app, request("GET", "/fleet/trucks", Some(second.owner), None)).await;
    assert_eq!(trucks[0]["is_available"], false);

    let late = register_carrier(&app).await;
    let (status, _) = bid(&app, &shipment_id, &late, 700.0).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn delivery_flow_releases_the_fleet_on_completion() {
    let app = setup();
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;
    let carrier = register_carrier(&app).await;
    let application_id = place_bid(&app, &shipment_id, &carrier, 1200.0).await;

    let (status, _) = send(
        &app,
        request("PATCH", &format!("/applications/{application_id}/accept"), Some(merchant), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, shipment) = send(
        &app,
        request(
            "PATCH",
            &format!("/shipments/{shipment_id}/status"),
            Some(carrier.driver),
            Some(json!({ "status": "IN_TRANSIT", "location": { "lat": 53.9, "lng": 14.2 } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipment["status"], "IN_TRANSIT");
    assert!(shipment["actual_pickup_date"].is_string());

    let (status, update) = send(
        &app,
        request(
            "POST",
            &format!("/shipments/{shipment_id}/location"),
            Some(carrier.driver),
            Some(json!({ "location": { "lat": 54.0, "lng": 16.0 } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["near_destination"], false);

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/shipments/{shipment_id}/status"),
            Some(merchant),
            Some(json!({ "status": "COMPLETED" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/shipments/{shipment_id}/status"),
            Some(carrier.driver),
            Some(json!({ "status": "DELIVERED" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, shipment) = send(
        &app,
        request(
            "PATCH",
            &format!("/shipments/{shipment_id}/status"),
            Some(merchant),
            Some(json!({ "status": "COMPLETED", "note": "signed off" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipment["status"], "COMPLETED");
    assert_eq!(shipment["timeline"].as_array().unwrap().len(), 5);

    let (_, trucks) = send(&app, request("GET", "/fleet/trucks", Some(carrier.owner), None)).await;
    assert_eq!(trucks[0]["is_available"], true);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/shipments/{shipment_id}"), Some(merchant), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = send(&app, request("GET", "/shipments", Some(merchant), None)).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_a_shipment_leaves_pending_bids_untouched() {
    let app = setup();
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;
    let carrier = register_carrier(&app).await;
    let application_id = place_bid(&app, &shipment_id, &carrier, 640.0).await;

    let (status, shipment) = send(
        &app,
        request(
            "PATCH",
            &format!("/shipments/{shipment_id}/status"),
            Some(merchant),
            Some(json!({ "status": "CANCELLED", "note": "order withdrawn" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipment["status"], "CANCELLED");

    let (_, application) = send(
        &app,
        request("GET", &format!("/applications/{application_id}"), Some(carrier.owner), None),
    )
    .await;
    assert_eq!(application["status"], "PENDING");

    let (status, _) = send(
        &app,
        request("PATCH", &format!("/applications/{application_id}/accept"), Some(merchant), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let other = register_carrier(&app).await;
    let (status, body) = bid(&app, &shipment_id, &other, 500.0).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("REQUESTED"));
}

#[tokio::test]
async fn reject_and_cancel_close_pending_bids() {
    let app = setup();
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;
    let first = register_carrier(&app).await;
    let second = register_carrier(&app).await;
    let a1 = place_bid(&app, &shipment_id, &first, 800.0).await;
    let a2 = place_bid(&app, &shipment_id, &second, 810.0).await;

    let (status, rejected) = send(
        &app,
        request(
            "PATCH",
            &format!("/applications/{a1}/reject"),
            Some(merchant),
            Some(json!({ "reason": "too expensive" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "REJECTED");

    let (status, _) = send(
        &app,
        request("PATCH", &format!("/applications/{a2}/cancel"), Some(first.owner), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = send(
        &app,
        request("PATCH", &format!("/applications/{a2}/cancel"), Some(second.owner), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (_, shipment) = send(&app, request("GET", &format!("/shipments/{shipment_id}"), Some(merchant), None)).await;
    assert_eq!(shipment["status"], "REQUESTED");
}

#[tokio::test]
async fn duplicate_bid_from_the_same_owner_conflicts() {
    let app = setup();
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;
    let carrier = register_carrier(&app).await;
    place_bid(&app, &shipment_id, &carrier, 700.0).await;

    let (status, _) = bid(&app, &shipment_id, &carrier, 650.0).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_status_value_returns_422() {
    let app = setup();
    let admin = Caller::new("ADMIN");
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/shipments/{shipment_id}/status"),
            Some(admin),
            Some(json!({ "status": "TELEPORTED" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn reconciliation_log_is_admin_only() {
    let app = setup();

    let (status, _) = send(&app, request("GET", "/reconciliation", Some(Caller::new("MERCHANT")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request("GET", "/reconciliation", Some(Caller::new("ADMIN")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn truck_owner_cannot_take_over_another_owners_driver() {
    let app = setup();
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;
    let honest = register_carrier(&app).await;
    let poacher = register_carrier(&app).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/fleet/users",
            Some(poacher.owner),
            Some(json!({
                "id": honest.driver.id,
                "name": "Piotr",
                "role": "DRIVER",
                "employer_id": poacher.owner.id
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/shipments/{shipment_id}/applications"),
            Some(poacher.owner),
            Some(json!({
                "truck_id": poacher.truck_id,
                "driver_id": honest.driver.id,
                "bid": { "price": 400.0, "currency": "EUR" }
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn assigned_driver_cannot_mark_themselves_available() {
    let app = setup();
    let merchant = Caller::new("MERCHANT");
    let shipment_id = create_shipment(&app, merchant).await;
    let carrier = register_carrier(&app).await;
    let application_id = place_bid(&app, &shipment_id, &carrier, 950.0).await;

    let (status, _) = send(
        &app,
        request("PATCH", &format!("/applications/{application_id}/accept"), Some(merchant), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/fleet/users/{}/availability", carrier.driver.id),
            Some(carrier.driver),
            Some(json!({ "is_available": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/fleet/trucks/{}/availability", carrier.truck_id),
            Some(carrier.owner),
            Some(json!({ "is_available": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, trucks) = send(&app, request("GET", "/fleet/trucks", Some(carrier.owner), None)).await;
    assert_eq!(trucks[0]["is_available"], false);
}
