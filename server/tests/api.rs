//! End-to-end tests driving the real router over HTTP: an in-memory
//! store, a stub regulator, and a reqwest client playing the meter app
//! and the rider app.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::post, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use server::{
    auth::{self, Claims, TokenSigner},
    build_router,
    server_state::ServerState,
};
use taxi_dispatch_data_management::DataManager;
use taxi_dispatch_lib::{driver::NewDriver, location_ping::NewLocationPing, status::AccountStatus};
use tokio::{net::TcpListener, sync::broadcast};

const SECRET: &str = "integration-test-secret";

struct TestApp {
    base: String,
    dm: DataManager,
    signer: TokenSigner,
    client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

/// Stub regulator accepting both report endpoints with 200.
async fn spawn_regulator() -> String {
    let handler = || async { Json(json!({ "received": true })) };
    let app = Router::new()
        .route("/trip_start", post(handler))
        .route("/trip_end", post(handler));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

async fn spawn_app() -> TestApp {
    let regulator = spawn_regulator().await;

    let dm = DataManager::start_in_memory().await.unwrap();
    let reporter = dm
        .reporter(&regulator, "regulator-key", Duration::from_secs(2))
        .unwrap()
        .spawn();

    let (tx, _rx) = broadcast::channel(16);
    let signer = TokenSigner::new(SECRET);

    let state = Arc::new(ServerState {
        tx,
        data_manager: dm.clone(),
        signer: signer.clone(),
        reporter,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    TestApp {
        base: format!("http://{addr}"),
        dm,
        signer,
        client: reqwest::Client::new(),
    }
}

struct Seeded {
    driver_id: i64,
    #[allow(dead_code)]
    vehicle_id: i64,
}

async fn seed_driver(
    dm: &DataManager,
    email: &str,
    password: &str,
    plate: &str,
    company_status: AccountStatus,
) -> Seeded {
    let company_id = dm
        .insert_company("Brussels Cabs", Some("BC-17"), company_status)
        .await
        .unwrap();
    let vehicle_id = dm
        .insert_vehicle(company_id, plate, "Toyota", "Prius", Some("black"))
        .await
        .unwrap();

    let hash = auth::hash_password(password).unwrap();
    let user_id = dm.insert_user(email, &hash, "DRIVER").await.unwrap();

    let driver_id = dm
        .insert_driver(&NewDriver {
            user_id,
            company_id,
            vehicle_id: Some(vehicle_id),
            first_name: "Jan".into(),
            last_name: "Peeters".into(),
            phone: "+32470000001".into(),
            taxi_driver_license: "TDL-7".into(),
            status: AccountStatus::Active,
        })
        .await
        .unwrap();

    Seeded { driver_id, vehicle_id }
}

async fn login(app: &TestApp, email: &str, password: &str) -> String {
    let response = app
        .client
        .post(app.url("/session"))
        .json(&json!({ "email": email, "password": password, "deviceId": "meter-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn driver_goes_online_and_appears_nearby() {
    let app = spawn_app().await;
    let seeded = seed_driver(&app.dm, "jan@cabs.test", "pass123", "1-ABC-123", AccountStatus::Active).await;

    // Authenticate.
    let response = app
        .client
        .post(app.url("/session"))
        .json(&json!({ "email": "jan@cabs.test", "password": "pass123", "deviceId": "meter-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["driver"]["name"], "Jan Peeters");
    assert_eq!(body["driver"]["vehicle"]["licensePlate"], "1-ABC-123");
    assert_eq!(body["message"], "Authentication successful");

    let driver = app.dm.get_driver(seeded.driver_id).await.unwrap();
    assert!(driver.is_online);

    // Push a location.
    let response = app
        .client
        .post(app.url("/location"))
        .bearer_auth(&token)
        .json(&json!({ "latitude": 50.8503, "longitude": 4.3517, "accuracy": 4.2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["id"].as_i64().unwrap() > 0);

    // A rider at the same corner sees the driver at distance zero.
    let response = app
        .client
        .get(app.url("/location?lat=50.8503&lng=4.3517&radius=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 1);
    let hit = &body["drivers"][0];
    assert_eq!(hit["id"].as_i64(), Some(seeded.driver_id));
    assert_eq!(hit["distance"].as_f64(), Some(0.0));
    assert_eq!(hit["estimatedArrivalMinutes"].as_i64(), Some(0));
    assert_eq!(hit["status"], "available");
    assert_eq!(body["center"]["lat"].as_f64(), Some(50.8503));

    // Logout takes the driver off the map.
    let response = app
        .client
        .delete(app.url("/session"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Logout successful");

    let driver = app.dm.get_driver(seeded.driver_id).await.unwrap();
    assert!(!driver.is_online);

    let response = app
        .client
        .get(app.url("/location?lat=50.8503&lng=4.3517&radius=10"))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn trip_lifecycle_reports_to_regulator() {
    let app = spawn_app().await;
    seed_driver(&app.dm, "jan@cabs.test", "pass123", "1-ABC-123", AccountStatus::Active).await;
    let token = login(&app, "jan@cabs.test", "pass123").await;

    // Start a trip.
    let response = app
        .client
        .post(app.url("/trips"))
        .bearer_auth(&token)
        .json(&json!({
            "logType": "TRIP_START",
            "startLatitude": 50.8503,
            "startLongitude": 4.3517,
            "startAddress": "Grand Place, Brussels",
            "tariffUsed": "day",
            "tripStartTime": "2026-08-05T10:00:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let start_id = body["id"].as_i64().unwrap();

    // A second start on the same vehicle conflicts while the trip is open.
    let response = app
        .client
        .post(app.url("/trips"))
        .bearer_auth(&token)
        .json(&json!({ "logType": "TRIP_START" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // The start report lands asynchronously.
    let mut reported = false;
    for _ in 0..40 {
        if app.dm.get_trip_log(start_id).await.unwrap().start_reported {
            reported = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(reported, "start event was never reported");

    let attempts = app.dm.list_report_attempts(start_id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
    assert_eq!(attempts[0].status_code, 200);
    assert!(attempts[0].endpoint.ends_with("/trip_start"));

    // End the trip, linked to its start.
    let response = app
        .client
        .post(app.url("/trips"))
        .bearer_auth(&token)
        .json(&json!({
            "logType": "TRIP_END",
            "parentId": start_id,
            "endLatitude": 50.8466,
            "endLongitude": 4.3528,
            "distance": 12.5,
            "duration": 1800,
            "finalPrice": 25.50,
            "tariffUsed": "day",
            "tripEndTime": "2026-08-05T10:30:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let end_id = body["id"].as_i64().unwrap();

    let mut reported = false;
    for _ in 0..40 {
        if app.dm.get_trip_log(end_id).await.unwrap().end_reported {
            reported = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(reported, "end event was never reported");

    // Newest first: end, start, then the login event; the rejected start
    // never made it in.
    let response = app
        .client
        .get(app.url("/trips?page=1&limit=50"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pagination"]["total"].as_i64(), Some(3));
    let trips = body["trips"].as_array().unwrap();
    assert_eq!(trips[0]["logType"], "TRIP_END");
    assert_eq!(trips[0]["parentId"].as_i64(), Some(start_id));
    assert_eq!(trips[0]["distance"].as_f64(), Some(12.5));
    assert_eq!(trips[0]["finalPrice"].as_f64(), Some(25.5));
    assert_eq!(trips[1]["logType"], "TRIP_START");
    assert_eq!(trips[2]["logType"], "DRIVER_LOGIN");
}

#[tokio::test]
async fn authentication_failures_map_to_statuses() {
    let app = spawn_app().await;
    let active = seed_driver(&app.dm, "jan@cabs.test", "pass123", "1-ABC-123", AccountStatus::Active).await;
    let suspended = seed_driver(&app.dm, "eva@cabs.test", "pass456", "1-DEF-456", AccountStatus::Suspended).await;

    // Missing fields.
    let response = app
        .client
        .post(app.url("/session"))
        .json(&json!({ "email": "jan@cabs.test" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Email and password are required");

    // Wrong password and unknown user share one body.
    let response = app
        .client
        .post(app.url("/session"))
        .json(&json!({ "email": "jan@cabs.test", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let wrong_password: Value = response.json().await.unwrap();

    let response = app
        .client
        .post(app.url("/session"))
        .json(&json!({ "email": "ghost@cabs.test", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let unknown_user: Value = response.json().await.unwrap();
    assert_eq!(wrong_password, unknown_user);

    // Suspended company: 403, and the driver stays offline.
    let response = app
        .client
        .post(app.url("/session"))
        .json(&json!({ "email": "eva@cabs.test", "password": "pass456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let driver = app.dm.get_driver(suspended.driver_id).await.unwrap();
    assert!(!driver.is_online);

    // Bearer is mandatory on driver routes.
    let response = app
        .client
        .post(app.url("/location"))
        .json(&json!({ "latitude": 1.0, "longitude": 2.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // An expired token fails verification and leaves presence untouched.
    login(&app, "jan@cabs.test", "pass123").await;
    assert!(app.dm.get_driver(active.driver_id).await.unwrap().is_online);

    let expired = app.signer.sign(&Claims {
        user_id: 1,
        driver_id: active.driver_id,
        company_id: 1,
        vehicle_id: None,
        role: "DRIVER".into(),
        iat: Utc::now().timestamp() - 7200,
        exp: Utc::now().timestamp() - 3600,
    });
    let response = app
        .client
        .delete(app.url("/session"))
        .bearer_auth(&expired)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert!(app.dm.get_driver(active.driver_id).await.unwrap().is_online);

    // Unknown routes get the uniform body too.
    let response = app.client.get(app.url("/nope")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn nearby_filters_by_radius_and_sorts_by_distance() {
    let app = spawn_app().await;

    // Two drivers, seeded directly through the store: one in central
    // Brussels, one in Antwerp (~41 km away).
    let near = seed_driver(&app.dm, "near@cabs.test", "x", "1-AAA-111", AccountStatus::Active).await;
    let far = seed_driver(&app.dm, "far@cabs.test", "x", "1-BBB-222", AccountStatus::Active).await;

    for (seeded, lat, lng) in [
        (&near, 50.8503, 4.3517),
        (&far, 51.2194, 4.4025),
    ] {
        app.dm.set_driver_presence(seeded.driver_id, true).await.unwrap();
        app.dm
            .record_location(
                seeded.driver_id,
                Some(seeded.vehicle_id),
                &NewLocationPing { latitude: lat, longitude: lng, ..Default::default() },
            )
            .await
            .unwrap();
    }

    // Small radius: only the Brussels driver.
    let response = app
        .client
        .get(app.url("/location?lat=50.8503&lng=4.3517&radius=10"))
        .send()
        .await
        .unwrap();
    let small: Value = response.json().await.unwrap();
    assert_eq!(small["count"], 1);
    assert_eq!(small["drivers"][0]["id"].as_i64(), Some(near.driver_id));

    // Large radius: both, nearest first, distances non-decreasing.
    let response = app
        .client
        .get(app.url("/location?lat=50.8503&lng=4.3517&radius=100"))
        .send()
        .await
        .unwrap();
    let large: Value = response.json().await.unwrap();
    assert_eq!(large["count"], 2);
    let drivers = large["drivers"].as_array().unwrap();
    assert_eq!(drivers[0]["id"].as_i64(), Some(near.driver_id));
    assert_eq!(drivers[1]["id"].as_i64(), Some(far.driver_id));
    let d0 = drivers[0]["distance"].as_f64().unwrap();
    let d1 = drivers[1]["distance"].as_f64().unwrap();
    assert!(d0 <= d1);
    assert!((d1 - 41.2).abs() < 1.0, "got {d1}");
    // The heuristic applies to the unrounded distance, so allow one
    // minute of slack against the rounded value we see here.
    let eta = drivers[1]["estimatedArrivalMinutes"].as_i64().unwrap();
    assert!((eta - (d1 * 2.0).ceil() as i64).abs() <= 1, "got {eta} for {d1} km");

    // The small-radius result is a subset of the large-radius result.
    let large_ids: Vec<i64> = drivers.iter().map(|d| d["id"].as_i64().unwrap()).collect();
    for hit in small["drivers"].as_array().unwrap() {
        assert!(large_ids.contains(&hit["id"].as_i64().unwrap()));
    }

    // Missing coordinates are a validation error.
    let response = app.client.get(app.url("/location?radius=10")).send().await.unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn preflight_gets_permissive_cors() {
    let app = spawn_app().await;

    let response = app
        .client
        .request(reqwest::Method::OPTIONS, app.url("/session"))
        .header("Origin", "https://riders.example")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "authorization,content-type")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
