//! Server certificate setup

use camlink_core::CamlinkError;
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, info};

/// Certificate chain and key served by the receiver
pub type CertifiedKey = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

/// Where the receiver's TLS certificate comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CertificateConfig {
    /// Generate a self-signed certificate at startup
    SelfSigned {
        /// Subject common name
        common_name: String,
        /// DNS names and IP addresses the certificate covers
        subject_alt_names: Vec<String>,
    },
    /// Load PEM or DER files
    FromFile {
        /// Certificate chain path
        cert_path: String,
        /// Private key path
        key_path: String,
    },
}

impl Default for CertificateConfig {
    fn default() -> Self {
        CertificateConfig::SelfSigned {
            common_name: "localhost".to_string(),
            subject_alt_names: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "0.0.0.0".to_string(),
            ],
        }
    }
}

impl CertificateConfig {
    /// Produce the certificate chain and private key.
    pub fn load(&self) -> Result<CertifiedKey, CamlinkError> {
        match self {
            CertificateConfig::SelfSigned {
                common_name,
                subject_alt_names,
            } => generate_self_signed(common_name, subject_alt_names),
            CertificateConfig::FromFile {
                cert_path,
                key_path,
            } => load_from_files(cert_path, key_path),
        }
    }
}

fn generate_self_signed(
    common_name: &str,
    subject_alt_names: &[String],
) -> Result<CertifiedKey, CamlinkError> {
    debug!("Generating self-signed certificate for {}", common_name);

    let mut params = CertificateParams::new(Vec::<String>::new());
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    for san in subject_alt_names {
        let entry = match san.parse::<IpAddr>() {
            Ok(ip) => SanType::IpAddress(ip),
            Err(_) => SanType::DnsName(san.clone()),
        };
        params.subject_alt_names.push(entry);
    }

    let cert = Certificate::from_params(params).map_err(|e| CamlinkError::Certificate {
        reason: format!("Failed to generate self-signed certificate: {}", e),
    })?;

    let cert_der = cert.serialize_der().map_err(|e| CamlinkError::Certificate {
        reason: format!("Failed to serialize certificate: {}", e),
    })?;
    let key_der = PrivateKeyDer::try_from(cert.serialize_private_key_der()).map_err(|e| {
        CamlinkError::Certificate {
            reason: format!("Failed to convert private key: {}", e),
        }
    })?;

    info!(
        "Generated self-signed certificate for {} ({} names)",
        common_name,
        subject_alt_names.len()
    );
    Ok((vec![CertificateDer::from(cert_der)], key_der))
}

fn load_from_files(cert_path: &str, key_path: &str) -> Result<CertifiedKey, CamlinkError> {
    debug!(
        "Loading certificate from {} and key from {}",
        cert_path, key_path
    );

    let cert_data = std::fs::read(cert_path).map_err(|e| CamlinkError::Certificate {
        reason: format!("Failed to read certificate file {}: {}", cert_path, e),
    })?;
    let key_data = std::fs::read(key_path).map_err(|e| CamlinkError::Certificate {
        reason: format!("Failed to read private key file {}: {}", key_path, e),
    })?;

    let chain = if cert_path.ends_with(".pem") {
        rustls_pemfile::certs(&mut cert_data.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CamlinkError::Certificate {
                reason: format!("Failed to parse certificate PEM: {}", e),
            })?
    } else {
        vec![CertificateDer::from(cert_data)]
    };

    let key = if key_path.ends_with(".pem") {
        rustls_pemfile::private_key(&mut key_data.as_slice())
            .map_err(|e| CamlinkError::Certificate {
                reason: format!("Failed to parse private key PEM: {}", e),
            })?
            .ok_or_else(|| CamlinkError::Certificate {
                reason: "No private key found in PEM file".to_string(),
            })?
    } else {
        PrivateKeyDer::try_from(key_data).map_err(|e| CamlinkError::Certificate {
            reason: format!("Failed to convert private key from file: {}", e),
        })?
    };

    if chain.is_empty() {
        return Err(CamlinkError::Certificate {
            reason: format!("No certificate found in {}", cert_path),
        });
    }

    info!("Loaded certificate chain with {} certificates", chain.len());
    Ok((chain, key))
}
