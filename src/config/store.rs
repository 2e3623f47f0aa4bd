use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::error::Result;
use crate::config::types::PipelineConfig;

/// Quiet period before a changed config is written back.
const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// A configuration file on disk plus the in-memory copy, with debounced
/// saving of runtime changes.
pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<PipelineConfig>,
    save_notify: Notify,
    is_dirty: AtomicBool,
}

impl ConfigStore {
    /// Open the store at `path`, loading the file if it exists. A missing
    /// file yields defaults; a malformed one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = Self::load(&path)?;
        Ok(Self::with_config(path, data))
    }

    /// A store for `path` holding `config`, without touching the disk.
    pub fn with_config(path: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        Self {
            path: path.into(),
            data: Mutex::new(config),
            save_notify: Notify::new(),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Load a config from a JSON file, returning defaults on a missing file.
    pub fn load(path: &Path) -> Result<PipelineConfig> {
        if !path.exists() {
            return Ok(PipelineConfig::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current config.
    pub fn config(&self) -> PipelineConfig {
        self.data.lock().clone()
    }

    /// Save the current config atomically (write .tmp then rename).
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().clone();
        let json = serde_json::to_string_pretty(&data)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Change the config in memory and schedule a debounced save.
    pub fn update(&self, change: impl FnOnce(&mut PipelineConfig)) {
        change(&mut *self.data.lock());
        self.is_dirty.store(true, Ordering::Release);
        self.save_notify.notify_one();
    }

    /// Remember whether processing is on, for the next run.
    pub fn set_processing(&self, enabled: bool) {
        self.update(|config| config.filter.enabled = enabled);
    }

    /// Start the debounce task: waits for a dirty notification, sleeps, then
    /// saves. Must be called from inside a tokio runtime.
    ///
    /// Uses an `AtomicBool` dirty flag so a change that lands between a save
    /// finishing and `notified().await` re-registering is not lost.
    pub fn start_debounce_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                store.save_notify.notified().await;
                tokio::time::sleep(SAVE_DEBOUNCE).await;
                store.flush();
            }
        })
    }

    /// Save now if anything changed since the last save.
    pub fn flush(&self) {
        if self.is_dirty.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.save() {
                tracing::warn!(path = %self.path.display(), "failed to save config: {e}");
            }
        }
    }
}
