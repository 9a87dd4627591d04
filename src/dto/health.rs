use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Backend serving the room documents, when one is installed.
    pub store: Option<String>,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(store: &str) -> Self {
        Self {
            status: "ok".to_string(),
            store: Some(store.to_string()),
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            store: None,
        }
    }
}
