#![cfg(feature = "rustls")]

use std::fs;
use std::io::{BufReader, Cursor};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, ClientConnection, DigitallySignedStruct, Error as RustlsError,
    KeyLogFile, RootCertStore, SignatureScheme, StreamOwned,
};

use crate::error::{ErrorCode, Result};

pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// X.509 certificate input: either a file path or inline PEM text. Mirrors
/// the same host-config convenience sqlx-core offers for `sslrootcert`.
#[derive(Clone, Debug)]
pub enum CertificateInput {
    Inline(Vec<u8>),
    File(PathBuf),
}

impl From<String> for CertificateInput {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with("-----BEGIN CERTIFICATE-----")
            && trimmed.contains("-----END CERTIFICATE-----")
        {
            CertificateInput::Inline(value.into_bytes())
        } else {
            CertificateInput::File(PathBuf::from(value))
        }
    }
}

impl CertificateInput {
    fn data(&self) -> Result<Vec<u8>> {
        match self {
            CertificateInput::Inline(v) => Ok(v.clone()),
            CertificateInput::File(path) => fs::read(path).map_err(|e| {
                bolt_err!(
                    ErrorCode::TlsError,
                    "failed to read certificate file '{}': {}",
                    path.display(),
                    e
                )
                .with_source(e)
            }),
        }
    }
}

/// The spec's `trust` connector option, resolved to the inputs a rustls
/// `ClientConfig` needs.
pub struct TlsConfig<'a> {
    pub accept_invalid_certs: bool,
    pub accept_invalid_hostnames: bool,
    pub hostname: &'a str,
    pub root_cert: Option<&'a CertificateInput>,
    pub client_cert: Option<&'a CertificateInput>,
    pub client_key: Option<&'a CertificateInput>,
}

pub(super) fn connect(stream: TcpStream, config: &TlsConfig<'_>) -> Result<TlsStream> {
    let client_config = configure(config)?;
    let server_name = ServerName::try_from(config.hostname.to_string())
        .map_err(|e| bolt_err!(ErrorCode::TlsError, "invalid server name '{}': {}", config.hostname, e))?;
    let conn = ClientConnection::new(Arc::new(client_config), server_name)
        .map_err(|e: RustlsError| Into::<crate::error::Error>::into(e))?;
    Ok(StreamOwned::new(conn, stream))
}

fn configure(tls_config: &TlsConfig<'_>) -> Result<ClientConfig> {
    let builder = ClientConfig::builder();

    let builder = if tls_config.accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DummyVerifier))
    } else {
        let mut cert_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect(),
        };

        if let Some(ca) = tls_config.root_cert {
            let data = ca.data()?;
            let mut cursor = Cursor::new(data);
            for cert in rustls_pemfile::certs(&mut cursor) {
                let cert = cert.map_err(|e| bolt_err!(ErrorCode::TlsError, "bad root certificate: {}", e))?;
                cert_store
                    .add(cert)
                    .map_err(|e| bolt_err!(ErrorCode::TlsError, "bad root certificate: {}", e))?;
            }
        }

        if tls_config.accept_invalid_hostnames {
            let verifier = WebPkiServerVerifier::builder(Arc::new(cert_store))
                .build()
                .map_err(|e| bolt_err!(ErrorCode::TlsError, "failed to build certificate verifier: {}", e))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoHostnameVerifier { verifier }))
        } else {
            builder.with_root_certificates(cert_store)
        }
    };

    let mut client_config = match (tls_config.client_cert, tls_config.client_key) {
        (Some(cert_path), Some(key_path)) => {
            let cert_chain = certs_from_pem(cert_path.data()?)?;
            let key_der = private_key_from_pem(key_path.data()?)?;
            builder
                .with_client_auth_cert(cert_chain, key_der)
                .map_err(|e: RustlsError| Into::<crate::error::Error>::into(e))?
        }
        (None, None) => builder.with_no_client_auth(),
        (_, _) => {
            return Err(bolt_err!(
                ErrorCode::TlsError,
                "client certificate and key must be configured together"
            ))
        }
    };

    // When SSLKEYLOGFILE is set, write session keys for offline decryption
    // with Wireshark, same diagnostic hook sqlx-core wires up.
    client_config.key_log = Arc::new(KeyLogFile::new());

    Ok(client_config)
}

fn certs_from_pem(pem: Vec<u8>) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(Cursor::new(pem));
    rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| e.into())
}

fn private_key_from_pem(pem: Vec<u8>) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(Cursor::new(pem));
    loop {
        match rustls_pemfile::read_one(&mut reader)? {
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            None => break,
            _ => {}
        }
    }
    Err(bolt_err!(ErrorCode::TlsError, "no private key found in pem input"))
}

#[derive(Debug)]
struct DummyVerifier;

impl ServerCertVerifier for DummyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        default_signature_schemes()
    }
}

#[derive(Debug)]
struct NoHostnameVerifier {
    verifier: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for NoHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, RustlsError> {
        drop_hostname_mismatch(
            self.verifier
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now),
        )
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        self.verifier.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        self.verifier.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.verifier.supported_verify_schemes()
    }
}

fn drop_hostname_mismatch(
    result: std::result::Result<ServerCertVerified, RustlsError>,
) -> std::result::Result<ServerCertVerified, RustlsError> {
    match result {
        Err(RustlsError::InvalidCertificate(CertificateError::NotValidForName)) => {
            Ok(ServerCertVerified::assertion())
        }
        other => other,
    }
}

fn default_signature_schemes() -> Vec<SignatureScheme> {
    vec![
        SignatureScheme::RSA_PKCS1_SHA1,
        SignatureScheme::ECDSA_SHA1_Legacy,
        SignatureScheme::RSA_PKCS1_SHA256,
        SignatureScheme::ECDSA_NISTP256_SHA256,
        SignatureScheme::RSA_PKCS1_SHA384,
        SignatureScheme::ECDSA_NISTP384_SHA384,
        SignatureScheme::RSA_PKCS1_SHA512,
        SignatureScheme::ECDSA_NISTP521_SHA512,
        SignatureScheme::RSA_PSS_SHA256,
        SignatureScheme::RSA_PSS_SHA384,
        SignatureScheme::RSA_PSS_SHA512,
        SignatureScheme::ED25519,
    ]
}
