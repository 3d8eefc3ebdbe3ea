use super::authority::QuotaUsage;
use crate::core::{Result, SweepError};
use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const USAGE_FILE: &str = "quota.json";

/// Quota usage carried between runs of the in-process authority.
///
/// Stored as JSON next to the record snapshot; replaced atomically.
pub struct QuotaUsageFile {
    path: PathBuf,
}

impl QuotaUsageFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(data_dir.as_ref().join(USAGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<QuotaUsage>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let usage: QuotaUsage = serde_json::from_str(&raw).map_err(|e| {
            SweepError::SerializationError(format!("Failed to parse quota usage: {}", e))
        })?;
        debug!("Loaded quota usage {}/{} from {}", usage.used, usage.daily_limit, self.path.display());
        Ok(Some(usage))
    }

    pub fn save(&self, usage: &QuotaUsage) -> Result<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        let serialized = serde_json::to_vec_pretty(usage).map_err(|e| {
            SweepError::SerializationError(format!("Failed to serialize quota usage: {}", e))
        })?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| SweepError::IoError(format!("Failed to replace quota usage: {}", e)))?;
        Ok(())
    }
}
