//! TLS leaf-certificate inspection
//!
//! Dials `host:443` with SNI and full verification, then reads identity
//! off the leaf certificate: subject and issuer common names, the validity
//! window, and a SHA-256 over the SubjectPublicKeyInfo DER (the stable key
//! identity that survives certificate renewals). Nothing beyond the leaf
//! is retained.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use crate::graph::CertNode;
use crate::TlsError;

/// Total budget for resolve + connect + handshake
const DIAL_BUDGET: Duration = Duration::from_secs(8);

/// Installs the process-wide rustls crypto provider
///
/// Must run once before any TLS connection; reinstalling is harmless.
pub fn init_crypto() {
    let _ = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::ring::default_provider(),
    );
}

/// Fetches leaf-certificate metadata for `host`
///
/// `Ok(None)` means the handshake completed but the peer presented no
/// certificates. Everything runs under one 8-second budget.
pub async fn fetch_cert(host: &str) -> Result<Option<CertNode>, TlsError> {
    match tokio::time::timeout(DIAL_BUDGET, dial_and_inspect(host)).await {
        Ok(result) => result,
        Err(_) => Err(TlsError::Timeout(DIAL_BUDGET)),
    }
}

async fn dial_and_inspect(host: &str) -> Result<Option<CertNode>, TlsError> {
    let addr = tokio::net::lookup_host((host, 443))
        .await
        .map_err(|_| TlsError::Resolve(host.to_string()))?
        .next()
        .ok_or_else(|| TlsError::Resolve(host.to_string()))?;

    let stream = TcpStream::connect(addr).await.map_err(TlsError::Connect)?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = match host.parse::<IpAddr>() {
        Ok(ip) => ServerName::IpAddress(ip.into()),
        Err(_) => ServerName::try_from(host.to_owned())
            .map_err(|_| TlsError::ServerName(host.to_string()))?,
    };

    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(TlsError::Handshake)?;

    let connection = tls.get_ref().1;
    let Some(certs) = connection.peer_certificates() else {
        return Ok(None);
    };
    let Some(leaf) = certs.first() else {
        return Ok(None);
    };

    leaf_metadata(leaf.as_ref()).map(Some)
}

/// Extracts the graph-relevant fields from a leaf certificate in DER form
fn leaf_metadata(der: &[u8]) -> Result<CertNode, TlsError> {
    let (_, x509) =
        X509Certificate::from_der(der).map_err(|e| TlsError::Parse(e.to_string()))?;

    let spki = Sha256::digest(x509.public_key().raw);

    Ok(CertNode {
        spki_sha256: BASE64.encode(spki),
        subject_cn: common_name(x509.subject()),
        issuer_cn: common_name(x509.issuer()),
        not_before: asn1_to_utc(&x509.validity().not_before),
        not_after: asn1_to_utc(&x509.validity().not_after),
    })
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("")
        .to_string()
}

fn asn1_to_utc(time: &ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .unwrap_or_default()
}
