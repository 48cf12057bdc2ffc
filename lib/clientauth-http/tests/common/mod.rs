//! Test PKI and a local HTTPS server that requires client certificates

use clientauth_tls::{Keystore, KeystoreFormat, PrivateKeyEntry, TrustedCertEntry};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::tokio::TokioIo;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub struct Leaf {
    pub cert: CertificateDer<'static>,
    pub key: Vec<u8>,
}

impl Leaf {
    pub fn key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.clone()))
    }
}

/// A CA with a client leaf, a server leaf (SAN 127.0.0.1) and a server leaf for another host
pub struct Pki {
    pub ca: CertificateDer<'static>,
    pub client: Leaf,
    pub server: Leaf,
    pub misnamed_server: Leaf,
}

impl Pki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "clientauth test ca");
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(ca_params, ca_key);

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::new(vec!["client.test".to_string()]).unwrap();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "client.test");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client_cert = client_params.signed_by(&client_key, &issuer).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let mut server_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        server_params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params.signed_by(&server_key, &issuer).unwrap();

        let misnamed_key = KeyPair::generate().unwrap();
        let mut misnamed_params =
            CertificateParams::new(vec!["elsewhere.test".to_string()]).unwrap();
        misnamed_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let misnamed_cert = misnamed_params.signed_by(&misnamed_key, &issuer).unwrap();

        Self {
            ca: CertificateDer::from(ca_cert.der().to_vec()),
            client: Leaf {
                cert: CertificateDer::from(client_cert.der().to_vec()),
                key: client_key.serialize_der(),
            },
            server: Leaf {
                cert: CertificateDer::from(server_cert.der().to_vec()),
                key: server_key.serialize_der(),
            },
            misnamed_server: Leaf {
                cert: CertificateDer::from(misnamed_cert.der().to_vec()),
                key: misnamed_key.serialize_der(),
            },
        }
    }

    /// JKS holding the client key (chain: leaf, CA) and the CA as a trusted entry
    pub fn client_keystore(&self, password: &str) -> Vec<u8> {
        let mut store = Keystore::new(KeystoreFormat::Jks);
        store.add_key_entry(PrivateKeyEntry::new(
            "client",
            self.client.key(),
            vec![self.client.cert.clone(), self.ca.clone()],
        ));
        store.add_trusted_entry(TrustedCertEntry::new("ca", self.ca.clone()));
        store.to_jks(password).unwrap()
    }
}

/// A self-signed server identity nobody trusts
pub fn stranger_server() -> Leaf {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["stranger.test".to_string()]).unwrap();
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    let cert = params.self_signed(&key).unwrap();
    Leaf {
        cert: CertificateDer::from(cert.der().to_vec()),
        key: key.serialize_der(),
    }
}

/// Passphrase and keystore files in a temporary directory
pub struct KeyFiles {
    _dir: tempfile::TempDir,
    pub passphrase: PathBuf,
    pub keystore: PathBuf,
}

pub fn write_key_files(password: &str, keystore: &[u8]) -> KeyFiles {
    let dir = tempfile::tempdir().unwrap();
    let passphrase = dir.path().join("keypass");
    let keystore_path = dir.path().join("keystore.jks");
    std::fs::write(&passphrase, format!("{}\n", password)).unwrap();
    std::fs::write(&keystore_path, keystore).unwrap();
    KeyFiles {
        _dir: dir,
        passphrase,
        keystore: keystore_path,
    }
}

/// Start an HTTPS server requiring a client certificate issued by `client_ca`.
///
/// Every response body reports the number of certificates the client presented.
pub async fn spawn_mtls_server(identity: &Leaf, client_ca: &CertificateDer<'static>) -> SocketAddr {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    roots.add(client_ca.clone()).unwrap();
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .unwrap();

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(vec![identity.cert.clone()], identity.key())
        .unwrap();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let acceptor = acceptor.clone();

            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(stream).await else {
                    return;
                };
                let peer_certs = tls
                    .get_ref()
                    .1
                    .peer_certificates()
                    .map(|certs| certs.len())
                    .unwrap_or(0);

                let service = service_fn(move |_req: Request<Incoming>| async move {
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(format!(
                        "peer-certs={}",
                        peer_certs
                    )))))
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), service)
                    .await;
            });
        }
    });

    addr
}
