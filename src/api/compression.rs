//! LZ4 Middleware
//!
//! Decodes request bodies carrying `Content-Encoding: lz4` (single block,
//! 4-byte little-endian uncompressed-length prefix, interoperable with the
//! Python lz4 library) or `lz4-frame` (streaming frames), and encodes
//! response bodies when the client's `Accept-Encoding` asks for either.
//! Incompressible block responses fall back to the raw bytes with the
//! encoding header stripped.

use std::io::{Read, Write};

use axum::body::Body;
use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{Error, Result};

const BLOCK_HEADER_LEN: usize = 4;

// == Block Codec ==
/// Encodes a single LZ4 block with the uncompressed length prefixed.
/// Returns `None` when compression does not shrink the payload.
pub fn encode_block(data: &[u8]) -> Option<Vec<u8>> {
    if data.is_empty() {
        return None;
    }

    let compressed = lz4_flex::block::compress(data);
    if compressed.is_empty() || compressed.len() >= data.len() {
        return None;
    }

    let mut out = Vec::with_capacity(BLOCK_HEADER_LEN + compressed.len());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&compressed);
    Some(out)
}

/// Decodes a length-prefixed LZ4 block. `content_length` is the declared
/// total payload size including the prefix.
pub fn decode_block(payload: &[u8], content_length: usize) -> Result<Vec<u8>> {
    if payload.len() < BLOCK_HEADER_LEN {
        return Err(Error::Codec("lz4 payload shorter than its length prefix".to_string()));
    }
    if payload.len() != content_length {
        return Err(Error::Codec(format!(
            "lz4 payload length {} does not match Content-Length {}",
            payload.len(),
            content_length
        )));
    }

    let uncompressed_len =
        u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let decoded = lz4_flex::block::decompress(&payload[BLOCK_HEADER_LEN..], uncompressed_len)
        .map_err(|e| Error::Codec(format!("lz4 block decode failed: {e}")))?;

    if decoded.len() != uncompressed_len {
        return Err(Error::Codec(format!(
            "unexpected uncompressed size, was: {}, expected: {}",
            decoded.len(),
            uncompressed_len
        )));
    }

    Ok(decoded)
}

// == Frame Codec ==
pub fn encode_frame(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
    encoder
        .write_all(data)
        .map_err(|e| Error::Codec(format!("lz4 frame encode failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Codec(format!("lz4 frame encode failed: {e}")))
}

pub fn decode_frame(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = lz4_flex::frame::FrameDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Codec(format!("lz4 frame decode failed: {e}")))?;
    Ok(out)
}

// == Middleware ==
pub async fn lz4(req: Request, next: Next) -> Result<Response> {
    // lz4-frame is checked first in both directions: a plain substring
    // check for "lz4" would also match it.
    let content_encoding = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let accept_encoding = req
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let req = match content_encoding.as_str() {
        "lz4-frame" => decode_request(req, decode_frame).await?,
        "lz4" => {
            let content_length = declared_content_length(&req)?;
            decode_request(req, move |payload| decode_block(payload, content_length)).await?
        }
        _ => req,
    };

    let resp = next.run(req).await;

    if accept_encoding.contains("lz4-frame") {
        let (mut parts, body) = resp.into_parts();
        let bytes = collect(body).await?;
        let encoded = encode_frame(&bytes)?;
        parts.headers.remove(header::CONTENT_LENGTH);
        parts
            .headers
            .insert(header::CONTENT_ENCODING, axum::http::HeaderValue::from_static("lz4-frame"));
        Ok(Response::from_parts(parts, Body::from(encoded)))
    } else if accept_encoding.contains("lz4") {
        let (mut parts, body) = resp.into_parts();
        let bytes = collect(body).await?;
        parts.headers.remove(header::CONTENT_LENGTH);
        match encode_block(&bytes) {
            Some(encoded) => {
                parts
                    .headers
                    .insert(header::CONTENT_ENCODING, axum::http::HeaderValue::from_static("lz4"));
                Ok(Response::from_parts(parts, Body::from(encoded)))
            }
            // Incompressible: raw bytes, no encoding header
            None => Ok(Response::from_parts(parts, Body::from(bytes))),
        }
    } else {
        Ok(resp)
    }
}

fn declared_content_length(req: &Request) -> Result<usize> {
    let raw = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let length: i64 = raw
        .parse()
        .map_err(|_| Error::Codec(format!("invalid Content-Length: {raw}")))?;
    if length < 0 {
        return Err(Error::Codec(format!("invalid Content-Length: {raw}")));
    }
    Ok(length as usize)
}

async fn decode_request<F>(req: Request, decode: F) -> Result<Request>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>>,
{
    let (mut parts, body) = req.into_parts();
    let bytes = collect(body).await?;
    let decoded = decode(&bytes)?;

    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);
    Ok(Request::from_parts(parts, Body::from(decoded)))
}

async fn collect(body: Body) -> Result<Vec<u8>> {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| Error::Codec(format!("could not read body: {e}")))?;
    Ok(bytes.to_vec())
}
