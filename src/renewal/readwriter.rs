// src/renewal/readwriter.rs
use crate::cert::openssl::{encode_cert_pem, encode_private_key_pem, parse_certs_pem};
use crate::cert::operations::{load_cert, paths_for_cert_and_key, write_cert_and_key};
use crate::cert::CertOperationError;
use crate::kubeconfig::KubeConfig;
use crate::utils::fs::{write_atomic, KEY_FILE_MODE};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use std::path::{Path, PathBuf};

/// Storage for one credential. Callers never need to know whether the certificate is a
/// standalone file pair or embedded in a kubeconfig file.
pub trait CertificateReadWriter {
    fn exists(&self) -> bool;
    fn read(&self) -> Result<X509, CertOperationError>;
    fn write(&self, cert: &X509, key: &PKey<Private>) -> Result<(), CertOperationError>;
}

/// A `<base>.crt` / `<base>.key` pair under the certificates directory.
#[derive(Debug, Clone)]
pub struct PkiCertificateReadWriter {
    base_name: String,
    certificate_dir: PathBuf,
}

impl PkiCertificateReadWriter {
    pub fn new(certificate_dir: &Path, base_name: &str) -> Self {
        Self {
            base_name: base_name.to_string(),
            certificate_dir: certificate_dir.to_path_buf(),
        }
    }

    pub fn paths(&self) -> (PathBuf, PathBuf) {
        paths_for_cert_and_key(&self.certificate_dir, &self.base_name)
    }
}

impl CertificateReadWriter for PkiCertificateReadWriter {
    fn exists(&self) -> bool {
        let (cert_path, key_path) = self.paths();
        key_path.is_file() && load_cert(&cert_path).is_ok()
    }

    fn read(&self) -> Result<X509, CertOperationError> {
        let (cert_path, _) = self.paths();
        load_cert(&cert_path)
    }

    fn write(&self, cert: &X509, key: &PKey<Private>) -> Result<(), CertOperationError> {
        write_cert_and_key(&self.certificate_dir, &self.base_name, cert, key)
    }
}

/// The client certificate embedded for the current user of a kubeconfig file.
#[derive(Debug, Clone)]
pub struct KubeConfigReadWriter {
    kubeconfig_path: PathBuf,
}

impl KubeConfigReadWriter {
    pub fn new(kubernetes_dir: &Path, kubeconfig_file_name: &str) -> Self {
        Self {
            kubeconfig_path: kubernetes_dir.join(kubeconfig_file_name),
        }
    }
}

impl CertificateReadWriter for KubeConfigReadWriter {
    fn exists(&self) -> bool {
        self.kubeconfig_path.is_file() && self.read().is_ok()
    }

    fn read(&self) -> Result<X509, CertOperationError> {
        let kubeconfig = KubeConfig::load(&self.kubeconfig_path)?;
        let pem = kubeconfig.client_certificate_data()?;

        parse_certs_pem(&pem)
            .map_err(|e| {
                CertOperationError::Parse(format!(
                    "{}: embedded client certificate: {}",
                    self.kubeconfig_path.display(),
                    e
                ))
            })?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CertOperationError::Parse(format!(
                    "{}: embedded client certificate is empty",
                    self.kubeconfig_path.display()
                ))
            })
    }

    fn write(&self, cert: &X509, key: &PKey<Private>) -> Result<(), CertOperationError> {
        // Reload so that edits made since the last read are kept.
        let mut kubeconfig = KubeConfig::load(&self.kubeconfig_path)?;
        let cert_pem = encode_cert_pem(cert)?;
        let key_pem = encode_private_key_pem(key)?;
        kubeconfig.set_client_credentials(&cert_pem, &key_pem)?;

        write_atomic(
            &self.kubeconfig_path,
            kubeconfig.to_yaml()?.as_bytes(),
            KEY_FILE_MODE,
        )
    }
}
