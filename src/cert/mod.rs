// src/cert/mod.rs
pub mod list;
pub mod openssl;
pub mod operations;
mod types;

#[cfg(test)]
pub mod testutil;

pub use operations::CertOperationError;
pub use types::{AltNames, CertConfig, EncryptionAlgorithm, ExtKeyUsage};
