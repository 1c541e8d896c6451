// src/persistence/json.rs
// Single-file JSON persistence. Writes go to a sibling temp file first and
// are renamed into place, so a crash mid-write never corrupts the last good
// snapshot.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{PersistedState, PersistenceBackend};

pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl PersistenceBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<PersistedState>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!("no persisted state at {}", self.path.display());
            return Ok(None);
        }

        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let state: PersistedState = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;

        info!(
            "loaded persisted state: {} short-term, {} long-term, {} epochs",
            state.short_term.len(),
            state.long_term.len(),
            state.epochs.len()
        );
        Ok(Some(state))
    }

    async fn persist(&self, state: &PersistedState) -> Result<()> {
        let mut snapshot = state.clone();
        snapshot.saved_at = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let raw = serde_json::to_vec_pretty(&snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &raw)
            .await
            .with_context(|| format!("writing {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("renaming into {}", self.path.display()))?;

        debug!("persisted {} bytes to {}", raw.len(), self.path.display());
        Ok(())
    }
}
