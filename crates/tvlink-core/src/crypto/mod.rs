//! Cryptographic primitives for tvlink.
//!
//! This module provides:
//! - The client certificate and key, generated once per installation
//! - TLS client configuration presenting that certificate
//! - The pairing secret derivation used with the TV's 6-character code
//!
//! ## Security Model
//!
//! - The TV authenticates the client by its certificate; the certificate
//!   becomes known to the TV through the pairing code exchange
//! - The TV's own certificate is self-signed, so the client does not verify it
//!   against a CA; trust comes from the code the user reads off the screen
//! - Deleting `cert.pem` and `key.pem` forces every TV to be paired again
//! - Both sides hold RSA keys: the pairing secret hashes the modulus and
//!   exponent of each certificate, so the client key is always RSA-2048

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::code::PairingCode;
use crate::error::{Error, Result};

/// File name of the client certificate.
pub const CERT_FILE: &str = "cert.pem";

/// File name of the client private key.
pub const KEY_FILE: &str = "key.pem";

/// Subject alternative name embedded in generated certificates.
const CERT_SUBJECT: &str = "tvlink";

/// Size of the generated client key.
const RSA_KEY_BITS: usize = 2048;

/// Client certificate and private key presented to the TV.
#[derive(Debug)]
pub struct ClientCertificate {
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

impl Clone for ClientCertificate {
    fn clone(&self) -> Self {
        Self {
            cert: self.cert.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl ClientCertificate {
    /// Generate a new self-signed certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if key or certificate generation fails.
    pub fn generate(common_name: &str) -> Result<Self> {
        let (cert, key_pair) = Self::generate_rcgen(common_name)?;

        let key = PrivateKeyDer::try_from(key_pair.serialize_der())
            .map_err(|e| Error::TlsError(format!("Failed to convert private key: {e}")))?;

        Ok(Self {
            cert: CertificateDer::from(cert.der().to_vec()),
            key,
        })
    }

    /// Load the certificate from `dir`, generating and saving one if either
    /// file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if existing files cannot be parsed or new ones cannot
    /// be written.
    pub fn load_or_generate(dir: &Path, common_name: &str) -> Result<Self> {
        let (cert_path, key_path) = Self::paths(dir);
        if cert_path.exists() && key_path.exists() {
            return Self::load(dir);
        }

        tracing::info!("Generating client certificate in {}", dir.display());
        let (cert, key_pair) = Self::generate_rcgen(common_name)?;

        fs::create_dir_all(dir).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to create key directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        fs::write(&cert_path, cert.pem())?;
        fs::write(&key_path, key_pair.serialize_pem())?;

        Self::load(dir)
    }

    /// Load the certificate and key from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or unparsable.
    pub fn load(dir: &Path) -> Result<Self> {
        let (cert_path, key_path) = Self::paths(dir);

        let mut cert_reader = BufReader::new(fs::File::open(&cert_path)?);
        let cert = rustls_pemfile::certs(&mut cert_reader)
            .next()
            .ok_or_else(|| {
                Error::TlsError(format!("No certificate in {}", cert_path.display()))
            })?
            .map_err(|e| Error::TlsError(format!("Failed to parse certificate: {e}")))?;

        let mut key_reader = BufReader::new(fs::File::open(&key_path)?);
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| Error::TlsError(format!("Failed to parse private key: {e}")))?
            .ok_or_else(|| Error::TlsError(format!("No private key in {}", key_path.display())))?;

        Ok(Self { cert, key })
    }

    /// Delete the certificate and key from `dir`.
    ///
    /// Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn delete(dir: &Path) -> Result<()> {
        let (cert_path, key_path) = Self::paths(dir);
        for path in [cert_path, key_path] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// DER encoding of the certificate.
    #[must_use]
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert
    }

    fn paths(dir: &Path) -> (PathBuf, PathBuf) {
        (dir.join(CERT_FILE), dir.join(KEY_FILE))
    }

    fn generate_rcgen(common_name: &str) -> Result<(rcgen::Certificate, rcgen::KeyPair)> {
        let mut params = rcgen::CertificateParams::new(vec![CERT_SUBJECT.to_string()])
            .map_err(|e| Error::TlsError(format!("Failed to create cert params: {e}")))?;
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, common_name.to_string());

        let key_pair = generate_rsa_key()?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::TlsError(format!("Failed to generate self-signed cert: {e}")))?;

        Ok((cert, key_pair))
    }
}

/// RSA key in the form rcgen signs with. ring cannot generate RSA keys, so the
/// key comes from the `rsa` crate as PKCS#8.
fn generate_rsa_key() -> Result<rcgen::KeyPair> {
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    let key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)
        .map_err(|e| Error::TlsError(format!("Failed to generate RSA key: {e}")))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::TlsError(format!("Failed to encode RSA key: {e}")))?;

    rcgen::KeyPair::from_pem(&pem)
        .map_err(|e| Error::TlsError(format!("Failed to load RSA key: {e}")))
}

/// TLS configuration for connections to the TV.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    client: Arc<rustls::ClientConfig>,
}

impl TlsConfig {
    /// Create a client configuration presenting `certificate`.
    ///
    /// The TV's certificate is accepted without CA verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not match a supported algorithm.
    pub fn client(certificate: &ClientCertificate) -> Result<Self> {
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertVerifier))
            .with_client_auth_cert(vec![certificate.cert.clone()], certificate.key.clone_key())
            .map_err(|e| Error::TlsError(format!("Failed to build client config: {e}")))?;

        Ok(Self {
            client: Arc::new(config),
        })
    }

    /// Shared rustls client configuration.
    #[must_use]
    pub fn client_config(&self) -> Arc<rustls::ClientConfig> {
        Arc::clone(&self.client)
    }

    /// Server configuration presenting `certificate`, without client
    /// authentication. Used by loopback tests that stand in for a TV.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built.
    pub fn loopback_server(certificate: &ClientCertificate) -> Result<Arc<rustls::ServerConfig>> {
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![certificate.cert.clone()], certificate.key.clone_key())
            .map_err(|e| Error::TlsError(format!("Failed to build server config: {e}")))?;
        Ok(Arc::new(config))
    }
}

/// Certificate verifier that accepts any certificate.
///
/// TVs present self-signed certificates; the pairing code establishes trust.
#[derive(Debug)]
struct AcceptAnyCertVerifier;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Public RSA numbers of a certificate, big-endian without leading zeros.
struct RsaNumbers {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaNumbers {
    fn from_cert(der: &[u8]) -> Result<Self> {
        use x509_parser::public_key::PublicKey;

        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| Error::TlsError(format!("Failed to parse certificate: {e}")))?;
        match cert.public_key().parsed() {
            Ok(PublicKey::RSA(key)) => Ok(Self {
                modulus: strip_leading_zeros(key.modulus).to_vec(),
                exponent: strip_leading_zeros(key.exponent).to_vec(),
            }),
            Ok(_) => Err(Error::TlsError(
                "certificate does not carry an RSA key".to_string(),
            )),
            Err(e) => Err(Error::TlsError(format!("Failed to read public key: {e}"))),
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// SHA-256 over client modulus, client exponent, server modulus, server
/// exponent and the code's nonce.
fn pairing_hash(client_cert: &[u8], server_cert: &[u8], nonce: [u8; 2]) -> Result<[u8; 32]> {
    use sha2::{Digest, Sha256};

    let client = RsaNumbers::from_cert(client_cert)?;
    let server = RsaNumbers::from_cert(server_cert)?;

    let mut hasher = Sha256::new();
    hasher.update(&client.modulus);
    hasher.update(&client.exponent);
    hasher.update(&server.modulus);
    hasher.update(&server.exponent);
    hasher.update(nonce);
    Ok(hasher.finalize().into())
}

/// Derive the pairing secret for `code`.
///
/// Both arguments are DER certificates. The first byte of the secret must
/// equal the code's check byte; a mismatch means the user typed a wrong code
/// and nothing is sent to the TV.
///
/// # Errors
///
/// Returns [`Error::PairingRejected`] if the check byte does not match, or
/// [`Error::TlsError`] if either certificate has no RSA key.
pub fn pairing_secret(
    client_cert: &[u8],
    server_cert: &[u8],
    code: &PairingCode,
) -> Result<[u8; 32]> {
    let secret = pairing_hash(client_cert, server_cert, code.nonce())?;

    if secret[0] == code.check_byte() {
        Ok(secret)
    } else {
        Err(Error::PairingRejected(format!(
            "code {code} does not match this TV"
        )))
    }
}

/// Build the code a TV would display for the given certificates and nonce.
///
/// Loopback tests use this to play the TV's side of the exchange.
///
/// # Errors
///
/// Returns an error if either certificate has no RSA key.
pub fn expected_pairing_code(
    client_cert: &[u8],
    server_cert: &[u8],
    nonce: [u8; 2],
) -> Result<String> {
    let check = pairing_hash(client_cert, server_cert, nonce)?[0];
    Ok(format!("{check:02X}{:02X}{:02X}", nonce[0], nonce[1]))
}
