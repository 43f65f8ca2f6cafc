use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{AppError, AppResult};

/// The `{success, message, status, data}` envelope every REST endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub status: u16,
    pub data: Value,
    #[serde(skip)]
    code: StatusCode,
}

impl ApiResponse {
    pub fn new(code: StatusCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            success: code.is_success(),
            message: message.into(),
            status: code.as_u16(),
            data: if data.is_null() { json!({}) } else { data },
            code,
        }
    }

    pub fn fail(code: StatusCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            ..Self::new(code, message, data)
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

/// `Json` whose rejections are rendered as a 400 envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

/// `Path` whose rejections are rendered as an envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathParam<T>(pub T);

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

pub fn ok(message: impl Into<String>, data: impl Serialize) -> AppResult<ApiResponse> {
    Ok(ApiResponse::new(StatusCode::OK, message, serde_json::to_value(data)?))
}

pub fn created(message: impl Into<String>, data: impl Serialize) -> AppResult<ApiResponse> {
    Ok(ApiResponse::new(StatusCode::CREATED, message, serde_json::to_value(data)?))
}

pub fn sorry<T>(what: &str) -> AppResult<T> {
    Err(AppError::not_found(format!("{what} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_data_becomes_empty_object() {
        let body = serde_json::to_value(ApiResponse::new(StatusCode::OK, "fine", Value::Null)).unwrap();
        assert_eq!(body, json!({"success": true, "message": "fine", "status": 200, "data": {}}));
    }

    #[test]
    fn fail_is_never_successful() {
        let res = ApiResponse::fail(StatusCode::OK, "odd", json!([]));
        assert!(!res.success);
        assert_eq!(res.status, 200);
    }
}
