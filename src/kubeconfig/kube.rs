use crate::cert::operations::read_file;
use crate::cert::CertOperationError;
use base64::{engine::general_purpose, Engine as _};
use serde_yaml::{Mapping, Value};
use std::path::Path;

const CLIENT_CERTIFICATE_DATA: &str = "client-certificate-data";
const CLIENT_KEY_DATA: &str = "client-key-data";

/// A kubeconfig document kept as a generic YAML tree, so that every field this crate
/// does not touch is written back exactly as it was read.
#[derive(Debug, Clone)]
pub struct KubeConfig {
    document: Value,
}

impl KubeConfig {
    pub fn load(path: &Path) -> Result<Self, CertOperationError> {
        let content = read_file(path)?;
        let content = String::from_utf8(content).map_err(|e| {
            CertOperationError::Parse(format!("{}: not valid UTF-8: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| CertOperationError::Parse(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self, String> {
        let document: Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        if !document.is_mapping() {
            return Err("kubeconfig is not a YAML mapping".to_string());
        }
        Ok(Self { document })
    }

    pub fn to_yaml(&self) -> Result<String, CertOperationError> {
        serde_yaml::to_string(&self.document)
            .map_err(|e| CertOperationError::Parse(format!("failed to serialize kubeconfig: {}", e)))
    }

    pub fn current_context(&self) -> Result<&str, CertOperationError> {
        self.document
            .get("current-context")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CertOperationError::Parse("kubeconfig has no current context".to_string()))
    }

    /// Name of the user referenced by the current context.
    pub fn current_user(&self) -> Result<&str, CertOperationError> {
        let context_name = self.current_context()?;
        named_entry(&self.document, "contexts", context_name)
            .and_then(|entry| entry.get("context"))
            .and_then(|context| context.get("user"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CertOperationError::Parse(format!(
                    "kubeconfig has no user for context {}",
                    context_name
                ))
            })
    }

    /// PEM bytes of the client certificate embedded for the current user.
    pub fn client_certificate_data(&self) -> Result<Vec<u8>, CertOperationError> {
        let user_name = self.current_user()?;
        let encoded = named_entry(&self.document, "users", user_name)
            .and_then(|entry| entry.get("user"))
            .and_then(|user| user.get(CLIENT_CERTIFICATE_DATA))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CertOperationError::Parse(format!(
                    "kubeconfig user {} has no embedded client certificate",
                    user_name
                ))
            })?;

        general_purpose::STANDARD.decode(encoded.trim()).map_err(|e| {
            CertOperationError::Parse(format!(
                "client certificate of user {} is not valid base64: {}",
                user_name, e
            ))
        })
    }

    /// Replaces the current user's embedded client certificate and key.
    pub fn set_client_credentials(
        &mut self,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<(), CertOperationError> {
        let user_name = self.current_user()?.to_string();
        let user = named_entry_mut(&mut self.document, "users", &user_name)
            .and_then(|entry| entry.get_mut("user"))
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| {
                CertOperationError::Parse(format!("kubeconfig has no user {}", user_name))
            })?;

        set_string(
            user,
            CLIENT_CERTIFICATE_DATA,
            general_purpose::STANDARD.encode(cert_pem),
        );
        set_string(user, CLIENT_KEY_DATA, general_purpose::STANDARD.encode(key_pem));
        Ok(())
    }
}

fn named_entry<'a>(document: &'a Value, list: &str, name: &str) -> Option<&'a Value> {
    document
        .get(list)?
        .as_sequence()?
        .iter()
        .find(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
}

fn named_entry_mut<'a>(document: &'a mut Value, list: &str, name: &str) -> Option<&'a mut Value> {
    document
        .get_mut(list)?
        .as_sequence_mut()?
        .iter_mut()
        .find(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
}

fn set_string(mapping: &mut Mapping, key: &str, value: String) {
    mapping.insert(Value::String(key.to_string()), Value::String(value));
}
