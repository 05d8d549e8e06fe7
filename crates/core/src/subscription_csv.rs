//! CSV import/export of webhook subscriptions.
//!
//! Columns: `name,url,secret,events,isActive,partnerId,headers`. `events` is
//! comma-joined inside a single quoted field; `headers` is a JSON object.
//! Columns are located by header name, so their order on import is free.
//! Rows that fail to parse are skipped and reported; the rest still import.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::CoreError;
use crate::subscriptions::{
    parse_event_list, validate_events, validate_headers, validate_name, validate_url,
};
use crate::types::DbId;

/// Column order used on export.
pub const CSV_COLUMNS: [&str; 7] = [
    "name",
    "url",
    "secret",
    "events",
    "isActive",
    "partnerId",
    "headers",
];

/// Upper bound on data rows in one import.
pub const MAX_IMPORT_ROWS: usize = 10_000;

/// Subscription fields carried by a CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRow {
    pub name: String,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub partner_id: Option<DbId>,
    pub headers: BTreeMap<String, String>,
}

/// A skipped row with its 1-based line number (the header is line 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub line: usize,
    pub reason: String,
}

/// A parsed row and the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub line: usize,
    pub row: SubscriptionRow,
}

/// Parsed rows plus the rows that were skipped.
#[derive(Debug, Clone, Default)]
pub struct CsvImport {
    pub rows: Vec<ImportRow>,
    pub skipped: Vec<RowError>,
}

/// Parse a subscriptions CSV.
///
/// Fails as a whole only when the file is empty, the header row is unreadable,
/// the `url` column is missing, or the row limit is exceeded.
pub fn parse_subscriptions_csv(data: &[u8]) -> Result<CsvImport, CoreError> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(CoreError::Validation("CSV file is empty".to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(data);

    let columns: HashMap<String, usize> = reader
        .headers()
        .map_err(|e| CoreError::Validation(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.to_string(), idx))
        .collect();
    if !columns.contains_key("url") {
        return Err(CoreError::Validation(
            "CSV header row must include a 'url' column".to_string(),
        ));
    }

    let mut import = CsvImport::default();
    for (idx, result) in reader.records().enumerate() {
        if idx >= MAX_IMPORT_ROWS {
            return Err(CoreError::Validation(format!(
                "CSV file exceeds maximum row limit of {MAX_IMPORT_ROWS}"
            )));
        }
        let line = idx + 2;
        let parsed = result
            .map_err(|e| format!("Failed to parse CSV row: {e}"))
            .and_then(|record| parse_row(&record, &columns));
        match parsed {
            Ok(row) => import.rows.push(ImportRow { line, row }),
            Err(reason) => import.skipped.push(RowError { line, reason }),
        }
    }
    Ok(import)
}

fn parse_row(
    record: &csv::StringRecord,
    columns: &HashMap<String, usize>,
) -> Result<SubscriptionRow, String> {
    let field = |name: &str| column(record, columns, name);

    let name = field("name").to_string();
    validate_name(&name).map_err(|e| e.to_string())?;

    let url = field("url").to_string();
    validate_url(&url).map_err(|e| e.to_string())?;

    let events = parse_event_list(field("events"));
    validate_events(&events).map_err(|e| e.to_string())?;

    let is_active = parse_bool(field("isActive"))?;

    let partner_id = match field("partnerId") {
        "" => None,
        raw => Some(
            raw.parse::<DbId>()
                .map_err(|_| format!("Invalid partnerId: '{raw}'"))?,
        ),
    };

    let headers = match field("headers") {
        "" => BTreeMap::new(),
        raw => serde_json::from_str::<BTreeMap<String, String>>(raw)
            .map_err(|e| format!("Invalid headers JSON: {e}"))?,
    };
    validate_headers(&headers).map_err(|e| e.to_string())?;

    Ok(SubscriptionRow {
        name,
        url,
        secret: field("secret").to_string(),
        events,
        is_active,
        partner_id,
        headers,
    })
}

fn column<'a>(record: &'a csv::StringRecord, columns: &HashMap<String, usize>, name: &str) -> &'a str {
    columns
        .get(name)
        .and_then(|&idx| record.get(idx))
        .map(str::trim)
        .unwrap_or("")
}

/// Blank means active.
fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("Invalid isActive value: '{other}'")),
    }
}

/// Serialize subscriptions to CSV with a header row.
pub fn write_subscriptions_csv(rows: &[SubscriptionRow]) -> Result<String, CoreError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CSV_COLUMNS)
        .map_err(|e| CoreError::Internal(format!("Failed to write CSV: {e}")))?;

    for row in rows {
        let headers = serde_json::to_string(&row.headers)
            .map_err(|e| CoreError::Internal(format!("Failed to encode headers: {e}")))?;
        let events = row.events.join(",");
        let partner_id = row.partner_id.map(|id| id.to_string()).unwrap_or_default();
        wtr.write_record([
            row.name.as_str(),
            row.url.as_str(),
            row.secret.as_str(),
            events.as_str(),
            if row.is_active { "true" } else { "false" },
            partner_id.as_str(),
            headers.as_str(),
        ])
        .map_err(|e| CoreError::Internal(format!("Failed to write CSV: {e}")))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| CoreError::Internal(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Internal(format!("CSV is not UTF-8: {e}")))
}
