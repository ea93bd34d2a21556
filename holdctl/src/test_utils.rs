//! Test utilities shared by the HTTP and extractor tests.

use axum_test::TestServer;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::{
    AppState,
    api::models::{events::EventResponse, users::CurrentUser},
    auth::session::create_session_token,
    build_router,
    config::{Config, DatabaseConfig},
    reservations::{Clock, ManualClock, ReservationService, SystemClock},
    storage::InMemoryStorage,
    types::UserId,
};

pub fn create_test_config() -> Config {
    let mut config = Config {
        secret_key: Some("test-secret-key-for-jwt".to_string()),
        database: DatabaseConfig::Memory,
        ..Default::default()
    };
    config.background_services.expiry_sweeper.enabled = false;
    config
}

pub fn create_test_state_with_clock(config: Config, clock: Arc<dyn Clock>) -> AppState<InMemoryStorage> {
    let service = ReservationService::builder()
        .storage(InMemoryStorage::new())
        .clock(clock)
        .hold_ttl(TimeDelta::from_std(config.reservations.hold_ttl).expect("hold_ttl out of range"))
        .build();

    AppState::builder().config(config).service(service).build()
}

pub fn create_test_state(config: Config) -> AppState<InMemoryStorage> {
    create_test_state_with_clock(config, Arc::new(SystemClock))
}

/// Fixed starting instant for tests driving a [`ManualClock`]
pub fn test_start_time() -> DateTime<Utc> {
    "2025-06-01T12:00:00Z".parse().expect("valid timestamp")
}

/// A test server over in-memory storage whose notion of "now" is controlled by the returned clock
pub fn create_test_app() -> (TestServer, AppState<InMemoryStorage>, ManualClock) {
    let clock = ManualClock::new(test_start_time());
    let state = create_test_state_with_clock(create_test_config(), Arc::new(clock.clone()));
    let router = build_router(state.clone()).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, state, clock)
}

pub fn add_auth_header(user_id: UserId) -> (String, String) {
    let token = create_session_token(&CurrentUser { id: user_id }, &create_test_config()).expect("Failed to create token");
    ("authorization".to_string(), format!("Bearer {token}"))
}

pub async fn create_test_event(server: &TestServer, capacity: i32) -> EventResponse {
    let (name, value) = add_auth_header(1);
    let response = server
        .post("/events")
        .add_header(&name, &value)
        .json(&json!({ "title": format!("Test event ({capacity} seats)"), "capacity": capacity }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json()
}
