//! Dashboard endpoint: caching, filtering and aggregate shape.

mod helpers;

use axum::http::{Method, StatusCode};
use helpers::TestApp;
use serde_json::{Value, json};
use sportscope::data::region::Region;
use std::collections::HashSet;
use std::time::Duration;

fn names(facilities: &Value) -> HashSet<String> {
    facilities
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn repeated_request_is_served_from_cache_verbatim() {
    let app = TestApp::new();
    let stadium = app.facility_type("Stadium").await;
    let football = app.sport("Football", stadium.id).await;
    app.facility("A", Region::Riyadh, stadium.id, vec![football.id], Some(4.0))
        .await;

    let uri = "/api/dashboard-data?region=SA-01&sports=Football";
    let first = app.get(uri).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.header("x-cache"), Some("MISS"));

    let reads = app.store.reads();
    let second = app.get(uri).await;
    assert_eq!(second.header("x-cache"), Some("HIT"));
    assert_eq!(first.body, second.body);
    assert_eq!(app.store.reads(), reads, "a hit must not query the store");
}

#[tokio::test]
async fn equivalent_parameter_orderings_share_a_cache_entry() {
    let app = TestApp::new();
    let first = app
        .get("/api/dashboard-data?sports=Tennis&sports=football")
        .await;
    assert_eq!(first.header("x-cache"), Some("MISS"));

    let second = app
        .get("/api/dashboard-data?sports=Football,%20tennis")
        .await;
    assert_eq!(second.header("x-cache"), Some("HIT"));
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn expired_entry_is_recomputed() {
    let app = TestApp::with_options(Duration::from_millis(50), None);
    let uri = "/api/dashboard-data";
    assert_eq!(app.get(uri).await.header("x-cache"), Some("MISS"));
    assert_eq!(app.get(uri).await.header("x-cache"), Some("HIT"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    let reads = app.store.reads();
    let again = app.get(uri).await;
    assert_eq!(again.header("x-cache"), Some("MISS"));
    assert!(app.store.reads() > reads);
}

#[tokio::test]
async fn region_codes_are_validated_and_applied() {
    let app = TestApp::new();
    let gym = app.facility_type("Gym").await;
    app.facility("Riyadh Gym", Region::Riyadh, gym.id, vec![], None)
        .await;
    app.facility("Jeddah Gym", Region::Makkah, gym.id, vec![], None)
        .await;

    let rejected = app.get("/api/dashboard-data?region=SA-99").await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    let body = rejected.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("INVALID_REGION"));

    let body = app.get("/api/dashboard-data?region=SA-01").await.json();
    assert_eq!(body["stats"]["totalFacilities"], json!(1));
    for facility in body["facilities"].as_array().unwrap() {
        assert_eq!(facility["region"], json!("RIYADH"));
    }
    assert_eq!(body["regions"][0]["code"], json!("SA-01"));
}

#[tokio::test]
async fn sports_filter_matches_facilities_offering_any_named_sport() {
    let app = TestApp::new();
    let stadium = app.facility_type("Stadium").await;
    let football = app.sport("Football", stadium.id).await;
    let tennis = app.sport("Tennis", stadium.id).await;
    let swimming = app.sport("Swimming", stadium.id).await;
    app.facility("Both", Region::Riyadh, stadium.id, vec![football.id, tennis.id], None)
        .await;
    app.facility("Court", Region::Riyadh, stadium.id, vec![tennis.id], None)
        .await;
    app.facility("Pool", Region::Riyadh, stadium.id, vec![swimming.id], None)
        .await;
    app.facility("Bare", Region::Riyadh, stadium.id, vec![], None)
        .await;

    let body = app
        .get("/api/dashboard-data?sports=football&sports=Tennis")
        .await
        .json();
    assert_eq!(
        names(&body["facilities"]),
        HashSet::from(["Both".to_owned(), "Court".to_owned()])
    );
    assert_eq!(body["pagination"]["total"], json!(2));

    let body = app.get("/api/dashboard-data?sports=Curling").await.json();
    assert_eq!(body["facilities"], json!([]));
    assert_eq!(body["stats"]["totalFacilities"], json!(0));
    assert_eq!(body["pagination"]["total"], json!(0));
}

#[tokio::test]
async fn average_rating_ignores_unrated_facilities() {
    let app = TestApp::new();
    let gym = app.facility_type("Gym").await;
    app.facility("A", Region::Riyadh, gym.id, vec![], Some(4.0)).await;
    app.facility("B", Region::Riyadh, gym.id, vec![], Some(5.0)).await;
    app.facility("C", Region::Riyadh, gym.id, vec![], None).await;

    let body = app.get("/api/dashboard-data").await.json();
    assert_eq!(body["stats"]["averageRating"], json!(4.5));
    assert_eq!(body["stats"]["totalFacilities"], json!(3));
}

#[tokio::test]
async fn top_sports_is_capped_and_descending() {
    let app = TestApp::new();
    let club = app.facility_type("Club").await;
    let mut sport_ids = Vec::new();
    for i in 0..10 {
        sport_ids.push(app.sport(&format!("Sport {i}"), club.id).await.id);
    }
    // Sport i is offered by i + 1 facilities.
    for n in 0..10 {
        let offered: Vec<i32> = sport_ids.iter().skip(9 - n).copied().collect();
        app.facility(&format!("F{n}"), Region::Asir, club.id, offered, None)
            .await;
    }

    let body = app.get("/api/dashboard-data").await.json();
    let top = body["topSports"].as_array().unwrap();
    assert_eq!(top.len(), 8);
    let counts: Vec<i64> = top.iter().map(|s| s["count"].as_i64().unwrap()).collect();
    assert!(counts.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(counts[0], 10);
    assert_eq!(body["sports"].as_array().unwrap().len(), 10);
    assert_eq!(body["stats"]["catalogSports"], json!(10));
}

#[tokio::test]
async fn writes_invalidate_cached_aggregates() {
    let app = TestApp::new();
    let gym = app.facility_type("Gym").await;

    let before = app.get("/api/dashboard-data").await.json();
    assert_eq!(before["stats"]["totalFacilities"], json!(0));

    let created = app
        .send(
            Method::POST,
            "/api/facilities",
            Some(json!({
                "name": "New Gym",
                "region": "SA-02",
                "address": "Jeddah",
                "facilityTypeId": gym.id,
            })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let after = app.get("/api/dashboard-data").await;
    assert_eq!(after.header("x-cache"), Some("MISS"));
    assert_eq!(after.json()["stats"]["totalFacilities"], json!(1));
}

#[tokio::test]
async fn cache_can_be_cleared_explicitly() {
    let app = TestApp::new();
    app.get("/api/dashboard-data").await;

    let unauthorized = app
        .request(Method::POST, "/api/cache/clear", None, None)
        .await;
    assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);

    let cleared = app.send(Method::POST, "/api/cache/clear", None).await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.json()["data"]["cleared"], json!(1));
    assert_eq!(
        app.get("/api/dashboard-data").await.header("x-cache"),
        Some("MISS")
    );
}

#[tokio::test]
async fn unknown_sort_field_is_rejected() {
    let app = TestApp::new();
    let response = app.get("/api/facilities?sortBy=password").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["code"], json!("INVALID_SORT"));
}
