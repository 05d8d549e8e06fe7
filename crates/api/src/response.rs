//! Shared response envelope types for API handlers.
//!
//! Management responses use a `{ "data": ... }` envelope. Ingestion answers
//! partner systems with a bare body instead.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// # Example
///
/// ```ignore
/// Ok(Json(DataResponse { data: items }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
