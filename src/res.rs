use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

pub fn ok<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (status, Json(Envelope { success: true, message, data: Some(data) })).into_response()
}

pub fn done(message: &str) -> Response {
    (StatusCode::OK, Json(Envelope::<()> { success: true, message, data: None })).into_response()
}

pub fn fail(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

pub async fn ready() -> &'static str {
    "Server is ready"
}

pub async fn not_found() -> Response {
    fail(StatusCode::NOT_FOUND, "Route not found".to_owned())
}
