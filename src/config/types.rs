// config/types.rs
use crate::cert::EncryptionAlgorithm;
use chrono::{Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::PathBuf};

pub const DEFAULT_CERTIFICATES_DIR: &str = "/etc/kubernetes/pki";
pub const DEFAULT_CERTIFICATE_VALIDITY_DAYS: u32 = 365;
/// X.509 GeneralizedTime stops at 9999-12-31.
const LAST_ENCODABLE_YEAR: i32 = 9999;

fn default_certificates_dir() -> String {
    DEFAULT_CERTIFICATES_DIR.to_string()
}

fn default_validity_days() -> u32 {
    DEFAULT_CERTIFICATE_VALIDITY_DAYS
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEtcd {
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEtcd {
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub ca_file: String,
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub key_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Etcd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalEtcd>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalEtcd>,
}

/// The resolved cluster topology the renewal manager is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(default = "default_certificates_dir")]
    pub certificates_dir: String,
    #[serde(default)]
    pub etcd: Etcd,
    #[serde(default)]
    pub encryption_algorithm: EncryptionAlgorithm,
    #[serde(default = "default_validity_days")]
    pub certificate_validity_days: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            certificates_dir: default_certificates_dir(),
            etcd: Etcd::default(),
            encryption_algorithm: EncryptionAlgorithm::default(),
            certificate_validity_days: DEFAULT_CERTIFICATE_VALIDITY_DAYS,
        }
    }
}

impl ClusterConfig {
    pub fn load_from_file(path: &str) -> io::Result<Self> {
        let config_str = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&config_str)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> io::Result<()> {
        let config_str = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, config_str)
    }

    pub fn validate(&self) -> io::Result<()> {
        if self.etcd.local.is_some() && self.etcd.external.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "etcd.local and etcd.external are mutually exclusive",
            ));
        }
        if self.certificate_validity_days == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "certificateValidityDays must be greater than zero",
            ));
        }
        let fits = Utc::now()
            .checked_add_signed(self.certificate_validity())
            .map_or(false, |not_after| not_after.year() < LAST_ENCODABLE_YEAR);
        if !fits {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "certificateValidityDays of {} reaches past the year {}",
                    self.certificate_validity_days, LAST_ENCODABLE_YEAR
                ),
            ));
        }
        Ok(())
    }

    pub fn uses_external_etcd(&self) -> bool {
        self.etcd.external.is_some()
    }

    /// Certificates directory with a leading `~` expanded.
    pub fn certificates_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.certificates_dir).to_string())
    }

    pub fn certificate_validity(&self) -> Duration {
        Duration::days(i64::from(self.certificate_validity_days))
    }
}
