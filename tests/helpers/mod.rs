//! Shared fixtures: an in-memory app driven through the real router.
#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use sportscope::data::memory::MemoryStore;
use sportscope::data::models::{
    Facility, FacilityInput, FacilityType, FacilityTypeInput, Sport, SportInput,
};
use sportscope::data::region::Region;
use sportscope::data::store::FacilityStore;
use sportscope::state::AppState;
use sportscope::web::create_router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const TOKEN: &str = "test-token";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(Duration::from_secs(300), Some(TOKEN))
    }

    pub fn with_options(ttl: Duration, token: Option<&str>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), ttl, token.map(str::to_owned));
        Self {
            router: create_router(state),
            store,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None, None).await
    }

    /// Authorized write.
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        self.request(method, uri, body, Some(TOKEN)).await
    }

    pub async fn facility_type(&self, name: &str) -> FacilityType {
        self.store
            .create_facility_type(&FacilityTypeInput {
                name: name.into(),
                description: None,
            })
            .await
            .unwrap()
    }

    pub async fn sport(&self, name: &str, facility_type_id: i32) -> Sport {
        self.store
            .create_sport(&SportInput {
                name: name.into(),
                facility_type_id,
                description: None,
            })
            .await
            .unwrap()
    }

    pub async fn facility(
        &self,
        name: &str,
        region: Region,
        facility_type_id: i32,
        sport_ids: Vec<i32>,
        rating: Option<f64>,
    ) -> Facility {
        self.store
            .create_facility(&FacilityInput {
                name: name.into(),
                region,
                country: "Saudi Arabia".into(),
                address: format!("{name} street"),
                rating,
                reviews: None,
                url: None,
                facility_type_id,
                ministry_of_sports: false,
                sport_ids,
            })
            .await
            .unwrap()
    }
}
