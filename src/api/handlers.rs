//! API Handlers
//!
//! Store, query, statistics and status endpoints. Frames travel through the
//! cache as `Arc<Frame>`: handlers clone the Arc under the cache lock and
//! work on the shared frame without copying column data.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tracing::debug;

use crate::api::headers::{
    self, HeaderValue, STAND_IN_HEADER, UNSLICED_LENGTH_HEADER,
};
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::frame::{Expr, Frame, Value};
use crate::query;
use crate::stats::ProbeSlot;

const CONTENT_TYPE_CSV: &str = "text/csv";
const CONTENT_TYPE_JSON: &str = "application/json";

fn format_content_type(media_type: &str) -> String {
    format!("{media_type}; charset=utf-8")
}

// == Store ==
/// Handler for POST /dataset/:key
///
/// Decodes the body into a frame according to Content-Type and stores it.
pub async fn store_dataset(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(probe): Extension<ProbeSlot>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    probe.start_store();

    let (media_type, charset) = headers::parse_content_type(
        request_headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(""),
    );
    if !charset.is_empty() && charset != "utf-8" {
        return Err(Error::bad_request(format!("Unsupported charset: {charset}")));
    }

    let frame = match media_type.as_str() {
        CONTENT_TYPE_CSV => {
            let opts = headers::csv_options(&request_headers)?;
            crate::frame::csv::read_csv(&body, &opts)
                .map_err(|e| Error::bad_request(format!("Could not decode data: {e}")))?
        }
        CONTENT_TYPE_JSON => {
            let opts = headers::json_options(&request_headers)?;
            crate::frame::json::read_json(&body, &opts)
                .map_err(|e| Error::bad_request(format!("Could not decode data: {e}")))?
        }
        other => return Err(Error::bad_request(format!("Unknown content type: {other}"))),
    };

    let frame = match add_stand_in_columns(&frame, &request_headers)? {
        Some(widened) => widened,
        None => frame,
    };

    let row_count = frame.len();
    let byte_size = frame.byte_size();
    state
        .cache
        .lock()
        .put(key, Arc::new(frame), byte_size)?;

    probe.store_success(row_count);
    Ok(StatusCode::CREATED)
}

// == Query ==
/// Handler for GET /dataset/:key. The query sits in the `q` URL parameter.
pub async fn query_dataset_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(probe): Extension<ProbeSlot>,
    request_headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let query_string = params.get("q").cloned().unwrap_or_default();
    query_dataset(state, key, probe, request_headers, query_string).await
}

/// Handler for POST /dataset/:key/q. The query is the request body.
pub async fn query_dataset_post(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(probe): Extension<ProbeSlot>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let query_string = String::from_utf8(body.to_vec())
        .map_err(|e| Error::bad_request(format!("Error reading query: {e}")))?;
    query_dataset(state, key, probe, request_headers, query_string).await
}

async fn query_dataset(
    state: AppState,
    key: String,
    probe: ProbeSlot,
    request_headers: HeaderMap,
    query_string: String,
) -> Result<Response> {
    probe.start_query();

    let Some(mut frame) = state.cache.lock().get(&key) else {
        probe.query_missing();
        return Err(Error::NotFound(key));
    };

    if let Some(widened) = add_stand_in_columns(frame.as_ref(), &request_headers)? {
        // The stored frame gains the new columns too, so later queries see
        // them without re-sending the header.
        let widened = Arc::new(widened);
        let byte_size = widened.byte_size();
        state.cache.lock().replace(&key, Arc::clone(&widened), byte_size);
        frame = widened;
    }

    let accept = request_headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let mut unsliced_len = None;
    let body = if query_string.is_empty() {
        encode_frame(frame.as_ref(), accept)?
    } else {
        let result = query::query(frame.as_ref(), &query_string)
            .map_err(|e| Error::bad_request(format!("Error executing query: {e}")))?;
        unsliced_len = Some(result.unsliced_len);
        encode_frame(&result.frame, accept)?
    };

    let mut resp = ([(header::CONTENT_TYPE, format_content_type(accept))], body).into_response();
    if let Some(unsliced_len) = unsliced_len {
        if let Ok(value) = axum::http::HeaderValue::from_str(&unsliced_len.to_string()) {
            resp.headers_mut().insert(UNSLICED_LENGTH_HEADER, value);
        }
    }

    probe.query_success();
    Ok(resp)
}

fn encode_frame(frame: &Frame, accept: &str) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let encoded = match accept {
        CONTENT_TYPE_CSV => crate::frame::csv::write_csv(frame, &mut body),
        CONTENT_TYPE_JSON => crate::frame::json::write_json(frame, &mut body),
        other => return Err(Error::bad_request(format!("Unknown accept type: {other}"))),
    };

    if let Err(err) = encoded {
        // Late encoding failures are server-side bugs; the recover
        // middleware turns this into a 500 with a stack hash.
        panic!("Failed writing query response: {err}");
    }
    Ok(body)
}

// == Stand-In Columns ==
/// Fabricates columns named by the stand-in header when the frame lacks
/// them. Returns the widened frame, or `None` when nothing was added.
fn add_stand_in_columns(frame: &Frame, request_headers: &HeaderMap) -> Result<Option<Frame>> {
    let stand_ins = headers::key_values(request_headers, STAND_IN_HEADER)
        .map_err(|e| Error::bad_request(format!("Error adding standin columns: {e}")))?;
    if stand_ins.is_empty() {
        return Ok(None);
    }

    let mut result: Option<Frame> = None;
    for (column, value) in stand_ins {
        let current = result.as_ref().unwrap_or(frame);
        if current.contains(&column) {
            continue;
        }

        let expr = match value {
            HeaderValue::Int(i) => Expr::Lit(Value::Int(i)),
            HeaderValue::Float(f) => Expr::Lit(Value::Float(f)),
            // Quoted means a string constant, bare means copy that column
            HeaderValue::Str(s) => query::string_expr(&s),
        };

        debug!(column = %column, "adding stand-in column");
        let widened = current
            .eval(&column, &expr)
            .map_err(|e| Error::bad_request(format!("Error adding standin columns: {e}")))?;
        result = Some(widened);
    }

    Ok(result)
}

// == Statistics ==
/// Handler for GET /statistics
pub async fn statistics(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Result<Response> {
    let accept = request_headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let accept = if accept.is_empty() || accept == "*/*" {
        CONTENT_TYPE_JSON
    } else {
        accept
    };

    if accept != CONTENT_TYPE_JSON {
        return Err(Error::bad_request(format!(
            "Unknown accept type: {accept}, statistics only available in JSON format"
        )));
    }

    let stats = state.stats.stats();
    let body = serde_json::to_vec(&stats)
        .map_err(|e| Error::bad_request(format!("Encoding stats: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, format_content_type(accept))],
        body,
    )
        .into_response())
}

// == Status ==
/// Handler for GET /status, liveness only.
pub async fn status() -> &'static str {
    "OK"
}
