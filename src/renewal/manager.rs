// src/renewal/manager.rs
use super::expiration::ExpirationInfo;
use super::policy::apply_credential_policy;
use super::readwriter::{CertificateReadWriter, KubeConfigReadWriter, PkiCertificateReadWriter};
use super::renewer::{cert_to_config, FileRenewer};
use crate::cert::list::{
    cert_tree, certs_without_etcd, default_cert_list, CA_BASE_NAME, CA_CERT_NAME,
    ETCD_CA_CERT_NAME, KUBECONFIG_FILES,
};
use crate::cert::openssl::{generate_private_key, new_csr};
use crate::cert::operations::{load_cert, load_cert_and_key, paths_for_cert_and_key, write_csr, write_key};
use crate::cert::{CertConfig, CertOperationError};
use crate::config::ClusterConfig;
use crate::utils::logging::Logger;
use openssl::x509::X509;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

fn unknown_certificate(name: &str) -> CertOperationError {
    CertOperationError::NotFound(format!(
        "{} is not a valid certificate for this cluster",
        name
    ))
}

/// A CA of the cluster. CAs are only inspected, never renewed.
pub struct CAExpirationHandler {
    pub name: String,
    pub long_name: String,
    pub file_name: String,
    readwriter: Box<dyn CertificateReadWriter>,
}

/// A certificate that can be renewed, either stored as a file pair or embedded in a
/// kubeconfig file.
pub struct CertificateRenewHandler {
    pub name: String,
    pub long_name: String,
    pub file_name: String,
    pub ca_name: String,
    /// File stem of the signing CA relative to the certificates directory.
    pub ca_base_name: String,
    readwriter: Box<dyn CertificateReadWriter>,
}

impl CertificateRenewHandler {
    pub fn exists(&self) -> bool {
        self.readwriter.exists()
    }

    pub fn read(&self) -> Result<X509, CertOperationError> {
        self.readwriter.read()
    }
}

impl CAExpirationHandler {
    pub fn exists(&self) -> bool {
        self.readwriter.exists()
    }

    pub fn read(&self) -> Result<X509, CertOperationError> {
        self.readwriter.read()
    }
}

/// Coordinates certificate renewal, CSR generation and expiration checks for the
/// certificates that belong to the current cluster topology.
pub struct Manager {
    cfg: ClusterConfig,
    certificates: HashMap<String, CertificateRenewHandler>,
    cas: HashMap<String, CAExpirationHandler>,
    logger: Box<dyn Logger>,
}

impl Manager {
    pub fn new(
        cfg: &ClusterConfig,
        kubernetes_dir: &Path,
        mut logger: Box<dyn Logger>,
    ) -> Result<Self, CertOperationError> {
        cfg.validate()
            .map_err(|e| CertOperationError::Configuration(e.to_string()))?;

        let certs = if cfg.uses_external_etcd() {
            logger.debug_log("External etcd: skipping etcd CA and certificates");
            certs_without_etcd()
        } else {
            default_cert_list()
        };
        let tree = cert_tree(&certs)?;
        let certificates_dir = cfg.certificates_dir();

        let mut certificates = HashMap::new();
        let mut cas = HashMap::new();

        for (ca, leaves) in tree.values() {
            for cert in leaves {
                certificates.insert(
                    cert.name.to_string(),
                    CertificateRenewHandler {
                        name: cert.name.to_string(),
                        long_name: cert.long_name.to_string(),
                        file_name: cert.base_name.to_string(),
                        ca_name: ca.name.to_string(),
                        ca_base_name: ca.base_name.to_string(),
                        readwriter: Box::new(PkiCertificateReadWriter::new(
                            &certificates_dir,
                            cert.base_name,
                        )),
                    },
                );
            }

            cas.insert(
                ca.name.to_string(),
                CAExpirationHandler {
                    name: ca.name.to_string(),
                    long_name: ca.long_name.to_string(),
                    file_name: ca.base_name.to_string(),
                    readwriter: Box::new(PkiCertificateReadWriter::new(
                        &certificates_dir,
                        ca.base_name,
                    )),
                },
            );
        }

        // The kubeconfig name doubles as the handler name; every embedded client
        // certificate is signed by the cluster CA.
        for (file_name, long_name) in KUBECONFIG_FILES {
            certificates.insert(
                file_name.to_string(),
                CertificateRenewHandler {
                    name: file_name.to_string(),
                    long_name: long_name.to_string(),
                    file_name: file_name.to_string(),
                    ca_name: CA_CERT_NAME.to_string(),
                    ca_base_name: CA_BASE_NAME.to_string(),
                    readwriter: Box::new(KubeConfigReadWriter::new(kubernetes_dir, file_name)),
                },
            );
        }

        logger.debug_log(&format!(
            "Renewal manager tracks {} certificates and {} CAs",
            certificates.len(),
            cas.len()
        ));

        Ok(Self {
            cfg: cfg.clone(),
            certificates,
            cas,
            logger,
        })
    }

    /// All certificate handlers, sorted by name.
    pub fn certificates(&self) -> Vec<&CertificateRenewHandler> {
        let mut certificates: Vec<&CertificateRenewHandler> = self.certificates.values().collect();
        certificates.sort_by(|a, b| a.name.cmp(&b.name));
        certificates
    }

    /// All CA handlers, sorted by name.
    pub fn cas(&self) -> Vec<&CAExpirationHandler> {
        let mut cas: Vec<&CAExpirationHandler> = self.cas.values().collect();
        cas.sort_by(|a, b| a.name.cmp(&b.name));
        cas
    }

    pub fn certificate(&self, name: &str) -> Result<&CertificateRenewHandler, CertOperationError> {
        self.certificates
            .get(name)
            .ok_or_else(|| unknown_certificate(name))
    }

    pub fn ca(&self, name: &str) -> Result<&CAExpirationHandler, CertOperationError> {
        self.cas.get(name).ok_or_else(|| {
            CertOperationError::NotFound(format!("{} is not a known CA", name))
        })
    }

    pub fn ca_exists(&self, name: &str) -> Result<bool, CertOperationError> {
        Ok(self.ca(name)?.exists())
    }

    pub fn certificate_exists(&self, name: &str) -> Result<bool, CertOperationError> {
        Ok(self.certificate(name)?.exists())
    }

    /// A CA is managed externally when its certificate is on disk but its key is not.
    /// The etcd CA is never considered external.
    pub fn is_externally_managed(&self, ca_name: &str) -> Result<bool, CertOperationError> {
        let ca = self.ca(ca_name)?;
        if ca.name == ETCD_CA_CERT_NAME {
            return Ok(false);
        }

        let (cert_path, key_path) = paths_for_cert_and_key(&self.cfg.certificates_dir(), &ca.file_name);
        if key_path.exists() {
            return Ok(false);
        }
        load_cert(&cert_path).map_err(|e| {
            CertOperationError::Configuration(format!(
                "failure loading {} certificate: {}",
                ca.name, e
            ))
        })?;
        Ok(true)
    }

    /// The stored certificate and the request its replacement is issued from.
    fn renewal_request(&self, name: &str) -> Result<(X509, CertConfig), CertOperationError> {
        let handler = self.certificate(name)?;
        let cert = handler.read()?;
        let mut config = cert_to_config(&cert)?;
        apply_credential_policy(name, &mut config);
        Ok((cert, config))
    }

    /// Re-issues the named certificate with the CA held in the certificates directory and
    /// writes it back where it was read from.
    pub fn renew_using_local_ca(&mut self, name: &str) -> Result<X509, CertOperationError> {
        self.renew_certificate(name)
            .map_err(|e| e.for_certificate(name))
    }

    fn renew_certificate(&mut self, name: &str) -> Result<X509, CertOperationError> {
        self.logger.log(&format!("Renewing certificate {}", name));

        let (current, config) = self.renewal_request(name)?;
        // Field borrow: the logger is needed mutably below.
        let handler = self
            .certificates
            .get(name)
            .ok_or_else(|| unknown_certificate(name))?;
        self.logger.debug_log(&format!(
            "{}: CN={} O={:?} usages={:?}",
            name, config.common_name, config.organization, config.usages
        ));

        let (ca_cert, ca_key) =
            load_cert_and_key(&self.cfg.certificates_dir(), &handler.ca_base_name).map_err(|e| {
                CertOperationError::Configuration(format!(
                    "failed to load CA {}: {}",
                    handler.ca_name, e
                ))
            })?;

        let (new_cert, new_key) = FileRenewer::new(ca_cert, ca_key).renew(
            &config,
            self.cfg.encryption_algorithm,
            self.cfg.certificate_validity(),
            Some(current.not_after()),
            self.logger.as_mut(),
        )?;

        handler.readwriter.write(&new_cert, &new_key)?;

        self.logger.log(&format!("Certificate {} renewed", name));
        Ok(new_cert)
    }

    /// Writes `<name>.key` and `<name>.csr` into `out_dir` for signing by an external CA.
    /// The stored certificate is left as it is.
    pub fn create_renew_csr(&mut self, name: &str, out_dir: &Path) -> Result<(), CertOperationError> {
        self.create_csr(name, out_dir)
            .map_err(|e| e.for_certificate(name))
    }

    fn create_csr(&mut self, name: &str, out_dir: &Path) -> Result<(), CertOperationError> {
        self.logger.log(&format!(
            "Generating CSR for {} into {}",
            name,
            out_dir.display()
        ));

        let (_, config) = self.renewal_request(name)?;

        fs::create_dir_all(out_dir)
            .map_err(|e| CertOperationError::io(out_dir, "create directory", e))?;

        let key = generate_private_key(self.cfg.encryption_algorithm, self.logger.as_mut())?;
        let csr = new_csr(&config, &key)?;

        write_key(out_dir, name, &key)?;
        write_csr(out_dir, name, &csr)?;

        self.logger.log(&format!("CSR for {} written", name));
        Ok(())
    }

    pub fn certificate_expiration(&self, name: &str) -> Result<ExpirationInfo, CertOperationError> {
        let handler = self.certificate(name)?;
        let cert = handler.read().map_err(|e| e.for_certificate(name))?;
        let externally_managed = self.is_externally_managed(&handler.ca_name)?;
        ExpirationInfo::new(name, &cert, externally_managed)
    }

    pub fn ca_expiration(&self, name: &str) -> Result<ExpirationInfo, CertOperationError> {
        let ca = self.ca(name)?;
        let cert = ca.read().map_err(|e| e.for_certificate(name))?;
        let externally_managed = self.is_externally_managed(name)?;
        ExpirationInfo::new(name, &cert, externally_managed)
    }
}
