// src/utils/fs.rs
use crate::cert::CertOperationError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const KEY_FILE_MODE: u32 = 0o600;
pub const CERT_FILE_MODE: u32 = 0o644;

/// Content written to a hidden sibling of `target` that only becomes visible under the
/// final name on [`StagedFile::commit`]. Dropping an uncommitted file removes the
/// temporary copy, so the previous content of `target` is never disturbed.
#[derive(Debug)]
pub struct StagedFile {
    temp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn stage(target: &Path, contents: &[u8], mode: u32) -> Result<Self, CertOperationError> {
        let parent = match target.parent() {
            Some(p) if p != Path::new("") => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| CertOperationError::io(&parent, "create directory", e))?;

        let file_name = target
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                CertOperationError::Configuration(format!(
                    "invalid target path: {}",
                    target.display()
                ))
            })?;
        let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        // The guard exists before the first byte hits the disk.
        let staged = Self {
            temp_path,
            target: target.to_path_buf(),
            committed: false,
        };

        let mut file = File::create(&staged.temp_path)
            .map_err(|e| CertOperationError::io(&staged.temp_path, "create temp file", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staged.temp_path, fs::Permissions::from_mode(mode))
                .map_err(|e| CertOperationError::io(&staged.temp_path, "set permissions", e))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        file.write_all(contents)
            .map_err(|e| CertOperationError::io(&staged.temp_path, "write temp file", e))?;
        file.sync_all()
            .map_err(|e| CertOperationError::io(&staged.temp_path, "sync temp file", e))?;

        Ok(staged)
    }

    pub fn commit(mut self) -> Result<(), CertOperationError> {
        fs::rename(&self.temp_path, &self.target)
            .map_err(|e| CertOperationError::io(&self.target, "rename into place", e))?;
        self.committed = true;

        if let Some(parent) = self.target.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

pub fn write_atomic(target: &Path, contents: &[u8], mode: u32) -> Result<(), CertOperationError> {
    StagedFile::stage(target, contents, mode)?.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("apiserver.crt");
        fs::write(&target, "old").unwrap();

        write_atomic(&target, b"new", CERT_FILE_MODE).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(entries(dir.path()), vec!["apiserver.crt".to_string()]);
    }

    #[test]
    fn dropped_stage_leaves_original_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("apiserver.key");
        fs::write(&target, "old").unwrap();

        {
            let _staged = StagedFile::stage(&target, b"new", KEY_FILE_MODE).unwrap();
            assert_eq!(entries(dir.path()).len(), 2);
        }

        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(entries(dir.path()), vec!["apiserver.key".to_string()]);
    }

    #[test]
    fn stage_creates_missing_parent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("etcd").join("server.crt");

        write_atomic(&target, b"pem", CERT_FILE_MODE).unwrap();
        assert!(target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn key_mode_is_applied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("sa.key");
        write_atomic(&target, b"secret", KEY_FILE_MODE).unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
