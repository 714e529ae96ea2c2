//! Request Middleware
//!
//! Statistics probe plumbing, the optional request log and optional HTTP
//! Basic auth. The LZ4 codec middleware lives in `compression`, panic
//! recovery in `recover`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use tracing::info;

use crate::error::Error;
use crate::stats::{ProbeSlot, Statistics};

// == Statistics ==
/// Attaches a fresh probe slot to the request and registers its outcome once
/// the inner handler finished.
pub async fn statistics(
    State(stats): State<Arc<Statistics>>,
    mut req: Request,
    next: Next,
) -> Response {
    let slot = ProbeSlot::new();
    req.extensions_mut().insert(slot.clone());
    let resp = next.run(req).await;
    stats.register(&slot);
    resp
}

// == Request Log ==
pub async fn request_log(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.to_string())
        .unwrap_or_else(|| "-".to_string());

    let resp = next.run(req).await;

    info!(
        "{} {} {} {} ms {} {}",
        method,
        path,
        resp.status().as_u16(),
        start.elapsed().as_millis(),
        host,
        remote
    );
    resp
}

// == Basic Auth ==
/// Credentials the basic-auth middleware checks against.
#[derive(Clone)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl BasicAuth {
    /// Parses the `user:password` configuration form.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut parts = input.splitn(2, ':');
        let (Some(user), Some(password)) = (parts.next(), parts.next()) else {
            return Err(Error::bad_request(format!(
                "invalid basic auth string, expected <username>:<password>, was: {input}"
            )));
        };
        if user.is_empty() {
            return Err(Error::bad_request(
                "invalid basic auth string, username must not be empty",
            ));
        }
        if password.is_empty() {
            return Err(Error::bad_request(
                "invalid basic auth string, password must not be empty",
            ));
        }

        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

pub async fn basic_auth(
    State(creds): State<Arc<BasicAuth>>,
    req: Request,
    next: Next,
) -> Response {
    if !authorised(&req, &creds) {
        return Error::Unauthorised.into_response();
    }
    next.run(req).await
}

fn authorised(req: &Request, creds: &BasicAuth) -> bool {
    let Some(header) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, password)) = decoded.split_once(':') else {
        return false;
    };

    // Both comparisons always run
    let user_ok = constant_time_eq(user.as_bytes(), creds.user.as_bytes());
    let password_ok = constant_time_eq(password.as_bytes(), creds.password.as_bytes());
    user_ok && password_ok
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_parse() {
        let creds = BasicAuth::parse("user:secret").unwrap();
        assert_eq!(creds.user, "user");
        assert_eq!(creds.password, "secret");

        // Passwords may contain colons
        let creds = BasicAuth::parse("user:se:cret").unwrap();
        assert_eq!(creds.password, "se:cret");

        assert!(BasicAuth::parse("nopassword").is_err());
        assert!(BasicAuth::parse(":secret").is_err());
        assert!(BasicAuth::parse("user:").is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(axum::body::Body::empty()).unwrap()
    }

    #[test]
    fn test_authorised() {
        let creds = BasicAuth {
            user: "u".to_string(),
            password: "p".to_string(),
        };

        // "u:p" base64
        let ok = request_with_auth(Some("Basic dTpw"));
        assert!(authorised(&ok, &creds));

        assert!(!authorised(&request_with_auth(None), &creds));
        assert!(!authorised(&request_with_auth(Some("Bearer dTpw")), &creds));
        assert!(!authorised(&request_with_auth(Some("Basic ???")), &creds));
        // "u:wrong" base64
        assert!(!authorised(&request_with_auth(Some("Basic dTp3cm9uZw==")), &creds));
    }
}
