use std::sync::{Arc, OnceLock};

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};

use crate::error::QuicError;

/// 双方握手固定携带的应用协议标识；不一致的对端握手必败。
pub const ALPN: &[u8] = b"weave-quic";

/// 客户端发起握手时使用的 SNI 名称。证书不做链校验，名称只需格式合法。
pub(crate) const SERVER_NAME: &str = "weave.local";

/// 自签名证书覆盖的主体备用名。
const CERT_SUBJECTS: [&str; 2] = ["weave.local", "localhost"];

struct EphemeralIdentity {
    cert: CertificateDer<'static>,
    key_der: Vec<u8>,
}

/// 进程级一次性身份：首次使用时生成，缓存至进程结束。
///
/// 并发的首次调用可能各自生成一份，`OnceLock` 只保留先到者；多生成的
/// 一份随即丢弃，不影响后续握手的一致性。
fn identity() -> Result<&'static EphemeralIdentity, QuicError> {
    static CELL: OnceLock<EphemeralIdentity> = OnceLock::new();
    if let Some(identity) = CELL.get() {
        return Ok(identity);
    }
    let certified = rcgen::generate_simple_self_signed(
        CERT_SUBJECTS
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>(),
    )
    .map_err(|source| QuicError::Identity { source })?;
    let generated = EphemeralIdentity {
        cert: certified.cert.der().clone(),
        key_der: certified.key_pair.serialize_der(),
    };
    Ok(CELL.get_or_init(|| generated))
}

/// 服务器端 QUIC 配置：自签名证书加固定应用协议标识。
pub(crate) fn server_config() -> Result<quinn::ServerConfig, QuicError> {
    let identity = identity()?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(identity.key_der.clone()));
    let mut crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![identity.cert.clone()], key)
        .map_err(|source| QuicError::Crypto { source })?;
    crypto.alpn_protocols = vec![ALPN.to_vec()];
    let crypto = QuicServerConfig::try_from(crypto)?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
}

/// 客户端 QUIC 配置：跳过证书链校验，固定应用协议标识。
pub(crate) fn client_config() -> Result<quinn::ClientConfig, QuicError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN.to_vec()];
    let crypto = QuicClientConfig::try_from(crypto)?;
    Ok(quinn::ClientConfig::new(Arc::new(crypto)))
}

/// 无条件信任服务器证书的校验器。
///
/// 封闭部署专用：对端身份由带外机制保证，这里只保留 TLS 的机密性与
/// 完整性。公开导出以便互操作测试构造自定义客户端配置。
#[derive(Debug)]
pub struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
