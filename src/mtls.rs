//! Mutual-TLS material — self-signed CA and CA-signed client leaf pairs.
//!
//! Pure functions over PEM buffers; no I/O and no target dependency. Each CA
//! is single-use: it signs exactly one client certificate and its private key
//! is dropped afterwards, never persisted.

use anyhow::{Context, Result};
use rand::Rng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, PKCS_ECDSA_P256_SHA256, SerialNumber,
};
use time::{Duration, OffsetDateTime};

/// Validity window for both CA and client certificates.
pub const CERT_VALIDITY_DAYS: i64 = 90;

/// Renewal threshold ahead of hard expiry. The update flow currently checks
/// hard expiry only; see DESIGN.md.
pub const CERT_EXPIRATION_THRESHOLD: Duration = Duration::days(3);

/// Generate a self-signed certificate authority for one stack.
///
/// Returns `(cert_pem, key_pem)`.
///
/// # Errors
///
/// Returns an error when key generation or certificate assembly fails.
pub fn generate_ca(hostname: &str) -> Result<(String, String)> {
    let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .context("failed to generate CA private key")?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .context("failed to create CA parameters")?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Finch");
    dn.push(DnType::CommonName, format!("Finch CA - {hostname}"));
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(CERT_VALIDITY_DAYS);
    params.serial_number = Some(random_serial());

    let cert = params
        .self_signed(&key)
        .context("failed to create CA certificate")?;

    Ok((cert.pem(), key.serialize_pem()))
}

/// Issue a client leaf certificate signed by the supplied CA.
///
/// The leaf is not a CA and carries the client-auth extended key usage only.
/// Returns `(cert_pem, key_pem)`.
///
/// # Errors
///
/// Returns an error when the CA material cannot be parsed or signing fails.
pub fn generate_client(
    hostname: &str,
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> Result<(String, String)> {
    let ca_key = KeyPair::from_pem(ca_key_pem).context("failed to parse CA private key")?;
    let ca_params = CertificateParams::from_ca_cert_pem(ca_cert_pem)
        .context("failed to parse CA certificate")?;
    let ca_cert = ca_params
        .self_signed(&ca_key)
        .context("failed to rebuild CA issuer")?;

    let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .context("failed to generate client private key")?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .context("failed to create client parameters")?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Finch");
    dn.push(DnType::CommonName, format!("Finch Client - {hostname}"));
    params.distinguished_name = dn;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(CERT_VALIDITY_DAYS);
    params.serial_number = Some(random_serial());

    let cert = params
        .signed_by(&key, &ca_cert, &ca_key)
        .context("failed to create client certificate")?;

    Ok((cert.pem(), key.serialize_pem()))
}

/// Check whether a PEM certificate is past its `NotAfter` date.
///
/// # Errors
///
/// Returns an error when the PEM or the certificate cannot be parsed.
pub fn is_expired(cert_pem: &str) -> Result<bool> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
        .map_err(|e| anyhow::anyhow!("failed to decode certificate PEM: {e}"))?;
    let cert = pem
        .parse_x509()
        .context("failed to parse certificate")?;
    Ok(unix_now() > cert.validity().not_after.timestamp())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Cryptographically random 128-bit serial. Serials are not tracked; each CA
/// signs a single certificate in its lifetime.
fn random_serial() -> SerialNumber {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    SerialNumber::from(bytes.to_vec())
}
