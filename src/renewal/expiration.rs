// src/renewal/expiration.rs
use crate::cert::CertOperationError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use openssl::x509::X509;
use std::fmt;
use x509_parser::prelude::{FromDer, X509Certificate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationStatus {
    Valid,
    ExpiringSoon,
    Expired,
}

impl fmt::Display for ExpirationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExpirationStatus::Valid => "valid",
            ExpirationStatus::ExpiringSoon => "expiring",
            ExpirationStatus::Expired => "EXPIRED",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationInfo {
    pub name: String,
    pub expiration_date: DateTime<Utc>,
    pub externally_managed: bool,
}

impl ExpirationInfo {
    pub fn new(name: &str, cert: &X509, externally_managed: bool) -> Result<Self, CertOperationError> {
        let der = cert.to_der()?;
        let (_remainder, parsed) = X509Certificate::from_der(&der)
            .map_err(|e| CertOperationError::Parse(format!("{}: {}", name, e)))?;

        let expiration_date = Utc
            .timestamp_opt(parsed.validity().not_after.timestamp(), 0)
            .single()
            .ok_or_else(|| {
                CertOperationError::Parse(format!("{}: invalid not_after timestamp", name))
            })?;

        Ok(Self {
            name: name.to_string(),
            expiration_date,
            externally_managed,
        })
    }

    /// Time left before expiration; negative once expired.
    pub fn residual_time(&self, now: DateTime<Utc>) -> Duration {
        self.expiration_date - now
    }

    pub fn status(&self, now: DateTime<Utc>) -> ExpirationStatus {
        let residual = self.residual_time(now);
        if residual <= Duration::zero() {
            ExpirationStatus::Expired
        } else if residual < Duration::days(30) {
            ExpirationStatus::ExpiringSoon
        } else {
            ExpirationStatus::Valid
        }
    }
}

/// Formats a duration the way `kubectl` prints ages: `364d`, `23h`, `5m`, or `<invalid>`.
pub fn short_human_duration(duration: Duration) -> String {
    if duration <= Duration::zero() {
        "<invalid>".to_string()
    } else if duration.num_days() > 0 {
        format!("{}d", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h", duration.num_hours())
    } else {
        format!("{}m", duration.num_minutes())
    }
}
