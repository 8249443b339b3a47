//! JSON-file credential store.
//!
//! Implements [`CredentialStore`] on top of a single `{ssid, password}`
//! record on disk.
//!
//! # Durability
//!
//! - Writes go to `<path>.tmp`, are fsynced, then renamed over the record,
//!   so a power cut leaves either the old or the new record, never half.
//! - The record is created `0600` on Unix; the secret is stored in clear.
//! - A malformed record reads as "no credentials" and is logged, never
//!   propagated as an error.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::app::ports::CredentialStore;
use crate::credentials::{CredentialFields, Credentials};
use crate::error::StoreError;

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn write_tmp(&self, tmp: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Store: no record at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                warn!("Store: failed to read {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        let fields: CredentialFields = match serde_json::from_str(&text) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Store: ignoring malformed record: {}", e);
                return Ok(None);
            }
        };
        match fields.into_credentials() {
            Ok(creds) => Ok(Some(creds)),
            Err(e) => {
                warn!("Store: ignoring invalid record: {}", e);
                Ok(None)
            }
        }
    }

    fn save(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io("create_dir", &e))?;
            }
        }

        let bytes =
            serde_json::to_vec(credentials).map_err(|e| StoreError::Encode(e.to_string()))?;
        let tmp = self.tmp_path();
        if let Err(e) = self.write_tmp(&tmp, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io("write", &e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io("rename", &e));
        }

        info!(
            "Store: saved credentials for '{}' to {}",
            credentials.network_id(),
            self.path.display()
        );
        Ok(())
    }

    fn delete(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Store: removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("remove", &e)),
        }
    }
}
