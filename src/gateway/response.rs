//! API response envelope and error codes.
//!
//! Every endpoint answers `{code, message, data}`: code 0 on success, a
//! module-prefixed numeric code on error, `data` omitted when null.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::order::OrderError;
use crate::persistence::PersistError;

/// Unified response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: codes::SUCCESS,
            message: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Handler return type: success tuple or error tuple, both enveloped.
pub type ApiResult<T> =
    Result<(StatusCode, Json<ApiResponse<T>>), (StatusCode, Json<ApiResponse<()>>)>;

#[inline]
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// Unified error with an HTTP status and an envelope code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::INVALID_PARAMS, msg)
    }

    pub fn not_found(code: i32, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err((
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.message)),
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ApiResponse::<()>::error(self.code, self.message));
        (self.status, body).into_response()
    }
}

impl From<ApiError> for (StatusCode, Json<ApiResponse<()>>) {
    fn from(err: ApiError) -> Self {
        (
            err.status,
            Json(ApiResponse::<()>::error(err.code, err.message)),
        )
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidQuantity => {
                ApiError::new(StatusCode::BAD_REQUEST, codes::ORDER_INVALID_QUANTITY, err.to_string())
            }
            OrderError::OutOfStock => {
                ApiError::new(StatusCode::BAD_REQUEST, codes::ORDER_OUT_OF_STOCK, err.to_string())
            }
            OrderError::NotFound => ApiError::not_found(codes::ORDER_NOT_FOUND, err.to_string()),
            OrderError::StockCacheMiss | OrderError::Transient(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::ORDER_TRANSIENT,
                err.to_string(),
            ),
            OrderError::Persist(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::ORDER_CREATE_FAILED,
                err.to_string(),
            ),
        }
    }
}

impl From<PersistError> for ApiError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::NotFound => ApiError::not_found(codes::NOT_FOUND, "not found"),
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Numeric error codes: module (2 digits) + type (2) + ordinal (2).
pub mod codes {
    // Common (10xxxx)
    pub const SUCCESS: i32 = 0;
    pub const INTERNAL_ERROR: i32 = 100000;
    pub const INVALID_JSON: i32 = 100001;
    pub const INVALID_PARAMS: i32 = 100002;
    pub const UNAUTHORIZED: i32 = 100003;
    pub const NOT_FOUND: i32 = 100004;

    // User module (20xxxx)
    pub const USER_NOT_FOUND: i32 = 201001;
    pub const USER_ALREADY_EXISTS: i32 = 201002;
    pub const INVALID_PASSWORD: i32 = 201003;

    // Commodity module (30xxxx)
    pub const COMMODITY_NOT_FOUND: i32 = 301001;
    pub const COMMODITY_CREATE_FAILED: i32 = 301002;

    // Order module (40xxxx)
    pub const ORDER_NOT_FOUND: i32 = 401001;
    pub const ORDER_OUT_OF_STOCK: i32 = 401002;
    pub const ORDER_INVALID_QUANTITY: i32 = 401003;
    pub const ORDER_CREATE_FAILED: i32 = 401004;
    pub const ORDER_TRANSIENT: i32 = 401005;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_has_code_zero() {
        let resp = ApiResponse::success(42);
        assert_eq!(resp.code, 0);
        assert_eq!(resp.data, Some(42));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"code":0,"message":"ok","data":42}"#);
    }

    #[test]
    fn error_envelope_omits_data() {
        let resp = ApiResponse::<()>::error(codes::ORDER_OUT_OF_STOCK, "out of stock");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"code":401002,"message":"out of stock"}"#);
    }

    #[test]
    fn order_errors_map_to_client_or_server_status() {
        let e: ApiError = OrderError::OutOfStock.into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        let e: ApiError = OrderError::Transient("boom".into()).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
