// cert/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "RSA-2048")]
    #[default]
    Rsa2048,
    #[serde(rename = "RSA-3072")]
    Rsa3072,
    #[serde(rename = "RSA-4096")]
    Rsa4096,
    #[serde(rename = "ECDSA-P256")]
    EcdsaP256,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtKeyUsage {
    Any,
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
    /// Dotted OID of a usage without a well-known name.
    Other(String),
}

impl fmt::Display for ExtKeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtKeyUsage::Any => write!(f, "anyExtendedKeyUsage"),
            ExtKeyUsage::ServerAuth => write!(f, "serverAuth"),
            ExtKeyUsage::ClientAuth => write!(f, "clientAuth"),
            ExtKeyUsage::CodeSigning => write!(f, "codeSigning"),
            ExtKeyUsage::EmailProtection => write!(f, "emailProtection"),
            ExtKeyUsage::TimeStamping => write!(f, "timeStamping"),
            ExtKeyUsage::OcspSigning => write!(f, "OCSPSigning"),
            ExtKeyUsage::Other(oid) => write!(f, "{}", oid),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltNames {
    pub dns_names: Vec<String>,
    pub ips: Vec<IpAddr>,
}

impl AltNames {
    pub fn is_empty(&self) -> bool {
        self.dns_names.is_empty() && self.ips.is_empty()
    }
}

/// Identity of a certificate to be issued or requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertConfig {
    pub common_name: String,
    pub organization: Vec<String>,
    pub alt_names: AltNames,
    pub usages: Vec<ExtKeyUsage>,
}

/// One entry of the control-plane certificate catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeadmCert {
    pub name: &'static str,
    pub long_name: &'static str,
    pub base_name: &'static str,
    /// Name of the signing CA; empty for the CAs themselves.
    pub ca_name: &'static str,
}

impl KubeadmCert {
    pub fn is_ca(&self) -> bool {
        self.ca_name.is_empty()
    }
}
