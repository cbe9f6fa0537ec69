// src/cert/openssl.rs
use super::types::{CertConfig, EncryptionAlgorithm, ExtKeyUsage};
use super::CertOperationError;
use crate::utils::logging::Logger;
use chrono::{Duration, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Extension, X509Name, X509Req, X509ReqBuilder, X509};
use std::cmp::Ordering;

const SERIAL_BITS: i32 = 159;

pub fn generate_private_key(
    algorithm: EncryptionAlgorithm,
    logger: &mut dyn Logger,
) -> Result<PKey<Private>, ErrorStack> {
    logger.debug_log(&format!("Generating {:?} private key", algorithm));

    match algorithm {
        EncryptionAlgorithm::Rsa2048 => PKey::from_rsa(Rsa::generate(2048)?),
        EncryptionAlgorithm::Rsa3072 => PKey::from_rsa(Rsa::generate(3072)?),
        EncryptionAlgorithm::Rsa4096 => PKey::from_rsa(Rsa::generate(4096)?),
        EncryptionAlgorithm::EcdsaP256 => {
            let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
            PKey::from_ec_key(EcKey::generate(&group)?)
        }
    }
}

fn subject_name(config: &CertConfig) -> Result<X509Name, ErrorStack> {
    let mut name = X509Name::builder()?;
    for organization in &config.organization {
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, organization)?;
    }
    name.append_entry_by_nid(Nid::COMMONNAME, &config.common_name)?;
    Ok(name.build())
}

fn random_serial() -> Result<openssl::asn1::Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn extended_key_usage(usages: &[ExtKeyUsage]) -> Result<X509Extension, ErrorStack> {
    let mut eku = ExtendedKeyUsage::new();
    for usage in usages {
        match usage {
            ExtKeyUsage::ServerAuth => eku.server_auth(),
            ExtKeyUsage::ClientAuth => eku.client_auth(),
            ExtKeyUsage::CodeSigning => eku.code_signing(),
            ExtKeyUsage::EmailProtection => eku.email_protection(),
            ExtKeyUsage::TimeStamping => eku.time_stamping(),
            other => eku.other(&other.to_string()),
        };
    }
    eku.build()
}

fn alt_names(config: &CertConfig) -> SubjectAlternativeName {
    let mut san = SubjectAlternativeName::new();
    for dns in &config.alt_names.dns_names {
        san.dns(dns);
    }
    for ip in &config.alt_names.ips {
        san.ip(&ip.to_string());
    }
    san
}

fn unix_timestamp(time: &Asn1TimeRef) -> Result<i64, ErrorStack> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    Ok(i64::from(diff.days) * 86_400 + i64::from(diff.secs))
}

/// `now + validity`, moved to one second past `previous` when the certificate being
/// replaced was issued for longer than that.
fn renewed_not_after(
    validity: Duration,
    previous: Option<&Asn1TimeRef>,
) -> Result<Asn1Time, CertOperationError> {
    let requested = Utc::now().checked_add_signed(validity).ok_or_else(|| {
        CertOperationError::Configuration(format!(
            "certificate validity of {} days is out of range",
            validity.num_days()
        ))
    })?;

    let mut not_after = requested.timestamp();
    if let Some(previous) = previous {
        not_after = not_after.max(unix_timestamp(previous)? + 1);
    }
    Ok(Asn1Time::from_unix(not_after as _)?)
}

/// Signs a leaf certificate for `key` with the given CA.
///
/// The serial number is freshly drawn for every call and the certificate is valid from
/// the CA's own NotBefore until `now + validity`. When `previous_not_after` is given the
/// new NotAfter is always strictly later than it.
pub fn new_signed_cert(
    config: &CertConfig,
    key: &PKey<Private>,
    ca_cert: &X509,
    ca_key: &PKey<Private>,
    validity: Duration,
    previous_not_after: Option<&Asn1TimeRef>,
    logger: &mut dyn Logger,
) -> Result<X509, CertOperationError> {
    if config.common_name.is_empty() {
        return Err(CertOperationError::CertGeneration(
            "must specify a CommonName".to_string(),
        ));
    }
    if config.usages.is_empty() {
        return Err(CertOperationError::CertGeneration(
            "must specify at least one ExtKeyUsage".to_string(),
        ));
    }

    let not_after = renewed_not_after(validity, previous_not_after)?;
    let serial = random_serial()?;
    let subject = subject_name(config)?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(ca_cert.subject_name())?;
    builder.set_pubkey(key)?;

    if ca_cert.not_after().compare(&not_after)? == Ordering::Less {
        logger.log(&format!(
            "WARNING: certificate {} will outlive its CA, which expires at {}",
            config.common_name,
            ca_cert.not_after()
        ));
    }
    builder.set_not_before(ca_cert.not_before())?;
    builder.set_not_after(&not_after)?;

    builder.append_extension(BasicConstraints::new().critical().build()?)?;

    let mut key_usage = KeyUsage::new();
    key_usage.critical().digital_signature();
    if key.rsa().is_ok() {
        key_usage.key_encipherment();
    }
    builder.append_extension(key_usage.build()?)?;
    builder.append_extension(extended_key_usage(&config.usages)?)?;

    let authority_key_id = {
        let context = builder.x509v3_context(Some(ca_cert), None);
        AuthorityKeyIdentifier::new().keyid(false).build(&context)?
    };
    builder.append_extension(authority_key_id)?;

    if !config.alt_names.is_empty() {
        let san = {
            let context = builder.x509v3_context(Some(ca_cert), None);
            alt_names(config).build(&context)?
        };
        builder.append_extension(san)?;
    }

    builder.sign(ca_key, MessageDigest::sha256())?;
    let cert = builder.build();

    logger.debug_log(&format!(
        "Signed certificate for {} valid until {}",
        config.common_name,
        cert.not_after()
    ));
    Ok(cert)
}

/// Builds an unsigned-by-CA request carrying the subject, SANs and requested usages.
pub fn new_csr(config: &CertConfig, key: &PKey<Private>) -> Result<X509Req, ErrorStack> {
    let subject = subject_name(config)?;
    let mut builder = X509ReqBuilder::new()?;
    builder.set_version(0)?;
    builder.set_subject_name(&subject)?;
    builder.set_pubkey(key)?;

    let mut extensions: Stack<X509Extension> = Stack::new()?;
    if !config.alt_names.is_empty() {
        let context = builder.x509v3_context(None);
        extensions.push(alt_names(config).build(&context)?)?;
    }
    if !config.usages.is_empty() {
        extensions.push(extended_key_usage(&config.usages)?)?;
    }
    if !extensions.is_empty() {
        builder.add_extensions(&extensions)?;
    }

    builder.sign(key, MessageDigest::sha256())?;
    Ok(builder.build())
}

pub fn encode_cert_pem(cert: &X509) -> Result<Vec<u8>, ErrorStack> {
    cert.to_pem()
}

pub fn encode_private_key_pem(key: &PKey<Private>) -> Result<Vec<u8>, ErrorStack> {
    key.private_key_to_pem_pkcs8()
}

pub fn encode_csr_pem(csr: &X509Req) -> Result<Vec<u8>, ErrorStack> {
    csr.to_pem()
}

pub fn parse_certs_pem(pem: &[u8]) -> Result<Vec<X509>, ErrorStack> {
    X509::stack_from_pem(pem)
}

pub fn parse_private_key_pem(pem: &[u8]) -> Result<PKey<Private>, ErrorStack> {
    PKey::private_key_from_pem(pem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::testutil::{self, MemoryLogger};
    use crate::cert::AltNames;
    use std::net::IpAddr;

    fn client_config() -> CertConfig {
        CertConfig {
            common_name: "test-common-name".to_string(),
            organization: vec!["sig-cluster-lifecycle".to_string()],
            alt_names: AltNames {
                dns_names: vec!["test-domain.space".to_string()],
                ips: vec!["10.100.0.1".parse::<IpAddr>().unwrap()],
            },
            usages: vec![ExtKeyUsage::ClientAuth],
        }
    }

    #[test]
    fn signed_cert_verifies_against_ca() {
        let (ca_cert, ca_key) = testutil::new_test_ca();
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::Rsa2048, &mut logger).unwrap();

        let cert = new_signed_cert(
            &client_config(),
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(365),
            None,
            &mut logger,
        )
        .unwrap();

        assert!(cert.verify(&ca_cert.public_key().unwrap()).unwrap());
        assert!(cert.public_key().unwrap().public_eq(&key));
        assert_eq!(
            cert.issuer_name().to_der().unwrap(),
            ca_cert.subject_name().to_der().unwrap()
        );
    }

    #[test]
    fn serial_numbers_are_fresh() {
        let (ca_cert, ca_key) = testutil::new_test_ca();
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::EcdsaP256, &mut logger).unwrap();

        let first = new_signed_cert(
            &client_config(),
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(1),
            None,
            &mut logger,
        )
        .unwrap();
        let second = new_signed_cert(
            &client_config(),
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(1),
            None,
            &mut logger,
        )
        .unwrap();

        let a = first.serial_number().to_bn().unwrap();
        let b = second.serial_number().to_bn().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn outliving_the_ca_is_logged() {
        let (ca_cert, ca_key) = testutil::new_test_ca();
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::EcdsaP256, &mut logger).unwrap();

        new_signed_cert(
            &client_config(),
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(365 * 50),
            None,
            &mut logger,
        )
        .unwrap();

        assert!(logger.lines().iter().any(|l| l.contains("will outlive its CA")));
    }

    #[test]
    fn empty_usages_are_rejected() {
        let (ca_cert, ca_key) = testutil::new_test_ca();
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::EcdsaP256, &mut logger).unwrap();
        let mut config = client_config();
        config.usages.clear();

        let err = new_signed_cert(
            &config,
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(1),
            None,
            &mut logger,
        )
        .unwrap_err();
        assert!(matches!(err, CertOperationError::CertGeneration(_)));
    }

    #[test]
    fn not_after_never_moves_backwards() {
        let (ca_cert, ca_key) = testutil::new_test_ca();
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::EcdsaP256, &mut logger).unwrap();
        let previous = Asn1Time::days_from_now(730).unwrap();

        let cert = new_signed_cert(
            &client_config(),
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(365),
            Some(&previous),
            &mut logger,
        )
        .unwrap();

        assert_eq!(
            previous.compare(cert.not_after()).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            unix_timestamp(cert.not_after()).unwrap(),
            unix_timestamp(&previous).unwrap() + 1
        );
    }

    #[test]
    fn configured_validity_wins_over_an_earlier_previous_not_after() {
        let (ca_cert, ca_key) = testutil::new_test_ca();
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::EcdsaP256, &mut logger).unwrap();
        let previous = Asn1Time::days_from_now(30).unwrap();

        let cert = new_signed_cert(
            &client_config(),
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(365),
            Some(&previous),
            &mut logger,
        )
        .unwrap();

        let lower = Asn1Time::days_from_now(364).unwrap();
        assert_eq!(lower.compare(cert.not_after()).unwrap(), Ordering::Less);
    }

    #[test]
    fn out_of_range_validity_is_a_configuration_error() {
        let (ca_cert, ca_key) = testutil::new_test_ca();
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::EcdsaP256, &mut logger).unwrap();

        let err = new_signed_cert(
            &client_config(),
            &key,
            &ca_cert,
            &ca_key,
            Duration::days(200_000_000),
            None,
            &mut logger,
        )
        .unwrap_err();
        assert!(matches!(err, CertOperationError::Configuration(_)));
    }

    #[test]
    fn csr_is_self_consistent() {
        let mut logger = MemoryLogger::new();
        let key = generate_private_key(EncryptionAlgorithm::Rsa2048, &mut logger).unwrap();

        let csr = new_csr(&client_config(), &key).unwrap();
        let pem = encode_csr_pem(&csr).unwrap();

        assert!(String::from_utf8_lossy(&pem).contains("BEGIN CERTIFICATE REQUEST"));
        assert!(csr.verify(&key).unwrap());
        let cn = csr
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(cn, "test-common-name");
    }
}
