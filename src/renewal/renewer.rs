// src/renewal/renewer.rs
use crate::cert::openssl::{generate_private_key, new_signed_cert};
use crate::cert::{AltNames, CertConfig, CertOperationError, EncryptionAlgorithm, ExtKeyUsage};
use crate::utils::logging::Logger;
use chrono::Duration;
use openssl::asn1::Asn1TimeRef;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use std::net::IpAddr;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

fn parse_error(e: impl std::fmt::Display) -> CertOperationError {
    CertOperationError::Parse(format!("failed to parse certificate: {}", e))
}

fn ip_from_bytes(bytes: &[u8]) -> Result<IpAddr, CertOperationError> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        Ok(IpAddr::from(octets))
    } else if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        Ok(IpAddr::from(octets))
    } else {
        Err(parse_error(format!(
            "IP subject alternative name has {} bytes",
            bytes.len()
        )))
    }
}

/// Recovers the request a certificate was issued from: common name, organizations,
/// subject alternative names and extended key usages.
pub fn cert_to_config(cert: &X509) -> Result<CertConfig, CertOperationError> {
    let der = cert.to_der()?;
    let (_remainder, parsed) = X509Certificate::from_der(&der).map_err(parse_error)?;

    let subject = parsed.subject();
    let common_name = match subject.iter_common_name().next() {
        Some(cn) => cn.as_str().map_err(parse_error)?.to_string(),
        None => String::new(),
    };
    let organization = subject
        .iter_organization()
        .map(|o| o.as_str().map(str::to_string))
        .collect::<Result<Vec<_>, _>>()
        .map_err(parse_error)?;

    let mut alt_names = AltNames::default();
    if let Some(san) = parsed.subject_alternative_name().map_err(parse_error)? {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => alt_names.dns_names.push(dns.to_string()),
                GeneralName::IPAddress(bytes) => alt_names.ips.push(ip_from_bytes(bytes)?),
                _ => {}
            }
        }
    }

    let mut usages = Vec::new();
    if let Some(eku) = parsed.extended_key_usage().map_err(parse_error)? {
        let eku = eku.value;
        let known = [
            (eku.any, ExtKeyUsage::Any),
            (eku.server_auth, ExtKeyUsage::ServerAuth),
            (eku.client_auth, ExtKeyUsage::ClientAuth),
            (eku.code_signing, ExtKeyUsage::CodeSigning),
            (eku.email_protection, ExtKeyUsage::EmailProtection),
            (eku.time_stamping, ExtKeyUsage::TimeStamping),
            (eku.ocsp_signing, ExtKeyUsage::OcspSigning),
        ];
        usages.extend(known.into_iter().filter(|(set, _)| *set).map(|(_, usage)| usage));
        usages.extend(eku.other.iter().map(|oid| ExtKeyUsage::Other(oid.to_id_string())));
    }

    Ok(CertConfig {
        common_name,
        organization,
        alt_names,
        usages,
    })
}

/// Issues replacement certificates with a CA whose key is held on this node.
pub struct FileRenewer {
    ca_cert: X509,
    ca_key: PKey<Private>,
}

impl FileRenewer {
    pub fn new(ca_cert: X509, ca_key: PKey<Private>) -> Self {
        Self { ca_cert, ca_key }
    }

    /// Signs `config` with a fresh key. The result expires after `previous_not_after`
    /// when one is given.
    pub fn renew(
        &self,
        config: &CertConfig,
        algorithm: EncryptionAlgorithm,
        validity: Duration,
        previous_not_after: Option<&Asn1TimeRef>,
        logger: &mut dyn Logger,
    ) -> Result<(X509, PKey<Private>), CertOperationError> {
        let key = generate_private_key(algorithm, logger)?;
        let cert = new_signed_cert(
            config,
            &key,
            &self.ca_cert,
            &self.ca_key,
            validity,
            previous_not_after,
            logger,
        )?;
        Ok((cert, key))
    }
}
