//! Server Shell
//!
//! Binds the listeners and runs the router: the main listener with optional
//! TLS and mutual-TLS client verification, and an optional plain secondary
//! listener that serves only /status for load-balancer health checks.
//! Shutdown is graceful: SIGINT/SIGTERM stop accepting and in-flight
//! requests get a grace period to finish.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{CipherSuite, NamedGroup, RootCertStore, ServerConfig};
use tokio::signal;
use tracing::{info, warn};

use crate::api;
use crate::config::Config;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Runs the server until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    let router = api::application(&config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    if config.http_status_port != 0 {
        let status_addr = SocketAddr::from(([0, 0, 0, 0], config.http_status_port));
        info!("status listener on http://{status_addr}");
        tokio::spawn(
            axum_server::bind(status_addr)
                .handle(handle.clone())
                .serve(api::status_router().into_make_service()),
        );
    }

    if let Some(cert_file) = &config.cert_file {
        let key_file = config.key_file.as_deref().unwrap_or(cert_file);
        let tls = tls_config(cert_file, key_file, config.ca_file.as_deref())?;
        info!("listening on https://{addr}");
        let mut server = axum_server::bind_rustls(addr, RustlsConfig::from_config(Arc::new(tls)));
        server
            .http_builder()
            .http1()
            .timer(hyper_util::rt::TokioTimer::new())
            .header_read_timeout(Duration::from_secs(config.read_header_timeout));
        server
            .handle(handle)
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .context("server error")?;
    } else {
        info!("listening on http://{addr}");
        let mut server = axum_server::bind(addr);
        server
            .http_builder()
            .http1()
            .timer(hyper_util::rt::TokioTimer::new())
            .header_read_timeout(Duration::from_secs(config.read_header_timeout));
        server
            .handle(handle)
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .context("server error")?;
    }

    info!("server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then begins graceful shutdown.
async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("received SIGTERM, initiating shutdown"),
    }

    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}

// == TLS ==
/// Server-side TLS: 1.2 minimum, AES-256-GCM suites, NIST curves, HTTP/2
/// disabled. When a CA file is given, clients must present a certificate
/// signed by it.
pub fn tls_config(
    cert_file: &str,
    key_file: &str,
    ca_file: Option<&str>,
) -> Result<ServerConfig> {
    info!("using server side TLS");

    let mut provider = rustls::crypto::ring::default_provider();
    provider.cipher_suites.retain(|suite| {
        matches!(
            suite.suite(),
            CipherSuite::TLS13_AES_256_GCM_SHA384
                | CipherSuite::TLS13_CHACHA20_POLY1305_SHA256
                | CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384
                | CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
        )
    });
    provider.kx_groups.retain(|group| {
        matches!(group.name(), NamedGroup::secp384r1 | NamedGroup::secp256r1)
    });

    let builder = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .context("TLS configuration error")?;

    let builder = if let Some(ca_file) = ca_file {
        info!("verifying client certificates");
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_file)? {
            roots
                .add(cert)
                .context("unable to use CA cert")?;
        }
        let verifier = WebPkiClientVerifier::builder_with_provider(
            Arc::new(roots),
            Arc::new(rustls::crypto::ring::default_provider()),
        )
        .build()
        .map_err(|e| anyhow!("unable to build client verifier: {e}"))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    let mut tls = builder
        .with_single_cert(load_certs(cert_file)?, load_private_key(key_file)?)
        .context("invalid certificate or key")?;

    // http/1.1 only
    tls.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(tls)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("unable to open cert file {path}"))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("unable to parse certs in {path}"))?;

    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {path}"));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .with_context(|| format!("unable to open key file {path}"))?;
    let mut reader = BufReader::new(file);

    for item in rustls_pemfile::read_all(&mut reader).flatten() {
        match item {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }

    Err(anyhow!("no private key found in {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_cert_file_errors() {
        assert!(tls_config("/definitely/not/there.pem", "/nor/this.pem", None).is_err());
    }

    #[test]
    fn test_missing_key_errors() {
        // A cert-only file cannot provide the private key
        let dir = std::env::temp_dir().join("framecache-tls-test");
        std::fs::create_dir_all(&dir).unwrap();
        let cert_path = dir.join("empty.pem");
        std::fs::write(&cert_path, "").unwrap();
        let path = cert_path.to_str().unwrap();
        assert!(load_certs(path).is_err());
        assert!(load_private_key(path).is_err());
    }
}
