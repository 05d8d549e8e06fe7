//! CSV import and export of subscriptions.

use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use vrtrust_core::subscription_csv::{
    parse_subscriptions_csv, write_subscriptions_csv, ImportRow, RowError,
};
use vrtrust_db::models::webhook::CreateSubscription;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the CSV file.
const FILE_FIELD: &str = "file";

/// Result of a CSV import.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    /// Subscriptions created.
    pub count: usize,
    /// Rows that were not imported, with reasons.
    pub skipped: Vec<RowError>,
}

/// POST /api/import/webhooks
///
/// Multipart upload with a `file` field. Bad rows, and rows the ledger
/// refuses, are skipped individually.
pub async fn import_subscriptions(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
            data = Some(bytes);
            break;
        }
    }
    let data = data.ok_or_else(|| {
        AppError::BadRequest(format!("Multipart field '{FILE_FIELD}' is required"))
    })?;

    let parsed = parse_subscriptions_csv(&data)?;
    let mut skipped = parsed.skipped;
    let mut count = 0;
    for ImportRow { line, row } in parsed.rows {
        match state
            .ledger()
            .create_subscription(&CreateSubscription::from(row))
            .await
        {
            Ok(_) => count += 1,
            Err(e) => {
                tracing::error!(line, error = %e, "Failed to import subscription row");
                skipped.push(RowError {
                    line,
                    reason: "Failed to save subscription".to_string(),
                });
            }
        }
    }
    skipped.sort_by_key(|e| e.line);

    tracing::info!(count, skipped = skipped.len(), "Subscriptions imported");

    Ok(Json(DataResponse {
        data: ImportResult { count, skipped },
    }))
}

/// GET /api/export/webhooks
///
/// Download every subscription as CSV, secrets included.
pub async fn export_subscriptions(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let subscriptions = state.ledger().list_subscriptions().await?;
    let rows: Vec<_> = subscriptions.iter().map(|s| s.to_row()).collect();
    let csv = write_subscriptions_csv(&rows)?;

    tracing::info!(count = rows.len(), "Subscriptions exported");

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                CONTENT_DISPOSITION,
                "attachment; filename=\"webhook-subscriptions.csv\"",
            ),
        ],
        csv,
    ))
}
