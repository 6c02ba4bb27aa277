// SPDX-License-Identifier: MIT OR Apache-2.0
//! Maps [`MeshError`] onto HTTP responses. 500s never leak internal detail,
//! just a generated request id.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mesh_error::MeshError;
use serde_json::json;
use uuid::Uuid;

/// An error surfaced at the HTTP boundary.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    context: serde_json::Value,
}

impl ApiError {
    /// Build an `ApiError` directly from a status and message, bypassing
    /// [`MeshError`] (used for request-shape errors axum itself detects).
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), context: json!({}) }
    }

    /// A 404 for an unknown route, carrying the list of known routes.
    pub fn not_found_with_routes(routes: &[&str]) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "route not found".to_string(),
            context: json!({ "availableRoutes": routes }),
        }
    }
}

impl From<MeshError> for ApiError {
    fn from(err: MeshError) -> Self {
        let status =
            StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, message: err.message.clone(), context: serde_json::to_value(&err.context).unwrap_or(json!({})) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.status.as_str(), "message": self.message });
        if let Some(obj) = body.as_object_mut() {
            if let Some(ctx) = self.context.as_object() {
                for (k, v) in ctx {
                    obj.insert(k.clone(), v.clone());
                }
            }
            if self.status == StatusCode::INTERNAL_SERVER_ERROR {
                obj.insert("requestId".to_string(), json!(Uuid::new_v4().to_string()));
            }
        }
        (self.status, Json(body)).into_response()
    }
}
