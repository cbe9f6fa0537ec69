// src/cert/operations.rs

use openssl::error::ErrorStack;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Req, X509};
use std::path::{Path, PathBuf};
use std::{fs, io};

use super::openssl::{
    encode_cert_pem, encode_csr_pem, encode_private_key_pem, parse_certs_pem, parse_private_key_pem,
};
use crate::utils::fs::{write_atomic, StagedFile, CERT_FILE_MODE, KEY_FILE_MODE};

#[derive(Debug)]
pub enum CertOperationError {
    NotFound(String),
    Configuration(String),
    IoError {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
    Parse(String),
    CertGeneration(String),
    Certificate {
        name: String,
        source: Box<CertOperationError>,
    },
}

impl CertOperationError {
    pub fn io(path: &Path, operation: &'static str, source: io::Error) -> Self {
        CertOperationError::IoError {
            path: path.to_path_buf(),
            operation,
            source,
        }
    }

    /// Attaches the name of the certificate whose operation failed.
    pub fn for_certificate(self, name: &str) -> Self {
        match self {
            CertOperationError::Certificate { .. } | CertOperationError::NotFound(_) => self,
            other => CertOperationError::Certificate {
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any certificate context stripped.
    pub fn root(&self) -> &CertOperationError {
        match self {
            CertOperationError::Certificate { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<CertOperationError> for io::Error {
    fn from(error: CertOperationError) -> Self {
        let kind = match error.root() {
            CertOperationError::NotFound(_) => io::ErrorKind::NotFound,
            CertOperationError::IoError { source, .. } => source.kind(),
            CertOperationError::Parse(_) => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, error.to_string())
    }
}

impl std::fmt::Display for CertOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(s) => write!(f, "Not Found: {}", s),
            Self::Configuration(s) => write!(f, "Configuration Error: {}", s),
            Self::IoError {
                path,
                operation,
                source,
            } => write!(f, "IO Error: {} {}: {}", operation, path.display(), source),
            Self::Parse(s) => write!(f, "Parse Error: {}", s),
            Self::CertGeneration(s) => write!(f, "Certificate Generation Error: {}", s),
            Self::Certificate { name, source } => write!(f, "certificate {}: {}", name, source),
        }
    }
}

impl std::error::Error for CertOperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError { source, .. } => Some(source),
            Self::Certificate { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ErrorStack> for CertOperationError {
    fn from(error: ErrorStack) -> Self {
        CertOperationError::CertGeneration(error.to_string())
    }
}

/// Returns the `<base>.crt` and `<base>.key` paths under `dir`.
pub fn paths_for_cert_and_key(dir: &Path, base_name: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}.crt", base_name)),
        dir.join(format!("{}.key", base_name)),
    )
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, CertOperationError> {
    fs::read(path).map_err(|e| CertOperationError::io(path, "read", e))
}

/// Reads the first certificate of a PEM bundle.
pub fn load_cert(path: &Path) -> Result<X509, CertOperationError> {
    let pem = read_file(path)?;
    parse_certs_pem(&pem)
        .map_err(|e| CertOperationError::Parse(format!("{}: {}", path.display(), e)))?
        .into_iter()
        .next()
        .ok_or_else(|| {
            CertOperationError::Parse(format!("no certificate found in {}", path.display()))
        })
}

pub fn load_key(path: &Path) -> Result<PKey<Private>, CertOperationError> {
    let pem = read_file(path)?;
    parse_private_key_pem(&pem)
        .map_err(|e| CertOperationError::Parse(format!("{}: {}", path.display(), e)))
}

pub fn load_cert_and_key(
    dir: &Path,
    base_name: &str,
) -> Result<(X509, PKey<Private>), CertOperationError> {
    let (cert_path, key_path) = paths_for_cert_and_key(dir, base_name);
    Ok((load_cert(&cert_path)?, load_key(&key_path)?))
}

/// Writes `<base>.crt` and `<base>.key`. Both files are staged before either is renamed.
/// The key is renamed first; if the certificate then fails to land, the previous key is
/// put back so the pair on disk never mixes generations.
pub fn write_cert_and_key(
    dir: &Path,
    base_name: &str,
    cert: &X509,
    key: &PKey<Private>,
) -> Result<(), CertOperationError> {
    let (cert_path, key_path) = paths_for_cert_and_key(dir, base_name);
    let key_pem = encode_private_key_pem(key)?;
    let cert_pem = encode_cert_pem(cert)?;

    let previous_key = match fs::read(&key_path) {
        Ok(pem) => Some(pem),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(CertOperationError::io(&key_path, "read", e)),
    };

    let staged_key = StagedFile::stage(&key_path, &key_pem, KEY_FILE_MODE)?;
    let staged_cert = StagedFile::stage(&cert_path, &cert_pem, CERT_FILE_MODE)?;
    staged_key.commit()?;

    if let Err(e) = staged_cert.commit() {
        match previous_key {
            Some(pem) => write_atomic(&key_path, &pem, KEY_FILE_MODE)?,
            None => fs::remove_file(&key_path)
                .map_err(|err| CertOperationError::io(&key_path, "remove", err))?,
        }
        return Err(e);
    }
    Ok(())
}

pub fn write_key(dir: &Path, name: &str, key: &PKey<Private>) -> Result<(), CertOperationError> {
    let pem = encode_private_key_pem(key)?;
    write_atomic(&dir.join(format!("{}.key", name)), &pem, KEY_FILE_MODE)
}

pub fn write_csr(dir: &Path, name: &str, csr: &X509Req) -> Result<(), CertOperationError> {
    let pem = encode_csr_pem(csr)?;
    write_atomic(&dir.join(format!("{}.csr", name)), &pem, CERT_FILE_MODE)
}
