// Helpers shared by the unit tests.
use super::openssl::{encode_cert_pem, encode_private_key_pem, new_signed_cert};
use super::operations::write_cert_and_key;
use super::types::{AltNames, CertConfig, ExtKeyUsage};
use crate::utils::logging::Logger;
use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509};
use std::fs;
use std::net::IpAddr;
use std::path::Path;

pub const TEST_ORGANIZATION: &str = "sig-cluster-lifecycle";

#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Vec<String>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Logger for MemoryLogger {
    fn log(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }

    fn debug_log(&mut self, message: &str) {
        self.lines.push(format!("DEBUG: {}", message));
    }
}

fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// A self-signed CA named "kubernetes", valid for ten years.
pub fn new_test_ca() -> (X509, PKey<Private>) {
    let key = ec_key();

    let mut name = X509Name::builder().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "kubernetes").unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(3650).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .digital_signature()
                .build()
                .unwrap(),
        )
        .unwrap();
    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(ski).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

pub fn test_cert_config(organization: &[&str]) -> CertConfig {
    CertConfig {
        common_name: "test-common-name".to_string(),
        organization: organization.iter().map(|o| o.to_string()).collect(),
        alt_names: AltNames {
            dns_names: vec!["test-domain.space".to_string()],
            ips: vec!["10.100.0.1".parse::<IpAddr>().unwrap()],
        },
        usages: vec![ExtKeyUsage::ClientAuth],
    }
}

/// Issues a short-lived client certificate so a renewal always moves NotAfter forward.
pub fn new_test_cert(
    ca_cert: &X509,
    ca_key: &PKey<Private>,
    organization: &[&str],
) -> (X509, PKey<Private>) {
    let key = ec_key();
    let mut logger = MemoryLogger::new();
    let cert = new_signed_cert(
        &test_cert_config(organization),
        &key,
        ca_cert,
        ca_key,
        Duration::days(30),
        None,
        &mut logger,
    )
    .unwrap();
    (cert, key)
}

/// Issues the same client certificate as [`new_test_cert`] with an explicit validity
/// window, given in days relative to now. Either bound may lie in the past.
pub fn new_test_cert_between(
    ca_cert: &X509,
    ca_key: &PKey<Private>,
    organization: &[&str],
    not_before_days: i64,
    not_after_days: i64,
) -> (X509, PKey<Private>) {
    let key = ec_key();
    let now = chrono::Utc::now().timestamp();

    let mut name = X509Name::builder().unwrap();
    for o in organization {
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, o).unwrap();
    }
    name.append_entry_by_nid(Nid::COMMONNAME, "test-common-name").unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    let serial = serial.to_asn1_integer().unwrap();
    let not_before = Asn1Time::from_unix((now + not_before_days * 86_400) as _).unwrap();
    let not_after = Asn1Time::from_unix((now + not_after_days * 86_400) as _).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(ca_cert.subject_name()).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&not_before).unwrap();
    builder.set_not_after(&not_after).unwrap();
    builder
        .append_extension(ExtendedKeyUsage::new().client_auth().build().unwrap())
        .unwrap();
    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(ca_cert), None))
        .unwrap();
    builder.append_extension(aki).unwrap();
    let san = SubjectAlternativeName::new()
        .dns("test-domain.space")
        .ip("10.100.0.1")
        .build(&builder.x509v3_context(Some(ca_cert), None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(ca_key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

pub fn write_test_certificate(
    dir: &Path,
    base_name: &str,
    ca_cert: &X509,
    ca_key: &PKey<Private>,
    organization: &[&str],
) -> X509 {
    let (cert, key) = new_test_cert(ca_cert, ca_key, organization);
    write_cert_and_key(dir, base_name, &cert, &key).unwrap();
    cert
}

pub fn test_kubeconfig_yaml(ca_cert: &X509, cert: &X509, key: &PKey<Private>) -> String {
    let encode = |pem: Vec<u8>| general_purpose::STANDARD.encode(pem);
    format!(
        r#"apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: {ca}
    server: https://192.168.0.10:6443
  name: kubernetes
contexts:
- context:
    cluster: kubernetes
    user: kubernetes-admin
  name: kubernetes-admin@kubernetes
current-context: kubernetes-admin@kubernetes
kind: Config
preferences: {{}}
users:
- name: someone-else
  user:
    token: abc123
- name: kubernetes-admin
  user:
    client-certificate-data: {cert}
    client-key-data: {key}
"#,
        ca = encode(encode_cert_pem(ca_cert).unwrap()),
        cert = encode(encode_cert_pem(cert).unwrap()),
        key = encode(encode_private_key_pem(key).unwrap()),
    )
}

pub fn write_test_kubeconfig(
    dir: &Path,
    file_name: &str,
    ca_cert: &X509,
    ca_key: &PKey<Private>,
) -> X509 {
    let (cert, key) = new_test_cert(ca_cert, ca_key, &[TEST_ORGANIZATION]);
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(file_name), test_kubeconfig_yaml(ca_cert, &cert, &key)).unwrap();
    cert
}
