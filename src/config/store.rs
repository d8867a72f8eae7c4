//! # ConfigStore: persistence, broadcast, and active-profile invariants
//!
//! Persists [`Profile`]s and [`GlobalSettings`] as JSON documents under a data
//! directory, mirroring a browser extension's `chrome.storage.local` flat
//! key-value namespace (reserved keys: `currentProfile`, `profiles.<name>`,
//! `globalSettings`, `ui.theme`, `customSelectors.<site>`,
//! `floatingPanel.<hostname>`, `crossChat`, `storedPrompt`,
//! `migrationComplete`). Each key maps to its own file so concurrent writers
//! (a popup process and a content-script process, in production) never
//! contend on unrelated keys.
//!
//! Writes are atomic: content is written to a temp file in the same
//! directory, fsynced, then renamed over the destination, guarded by an
//! exclusive `fs2` lock on the destination so two writers serialize
//! last-write-wins instead of interleaving.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::broadcast::{BroadcastBus, BusMessage, Origin, TabId};
use crate::config::{CustomSelectors, FloatingPanelSettings, GlobalSettings, Profile};
use crate::errors::{EngineError, Result};
use crate::validation::{safe_storage_key, secure_json_parse, validate_file_size};

/// Cap on a single document's on-disk size; guards against a corrupted or
/// hostile file being read into memory unbounded.
const MAX_DOCUMENT_BYTES: u64 = 1_000_000;

const DEFAULT_PROFILE_NAME: &str = "Default";

pub struct ConfigStore {
    data_dir: PathBuf,
    bus: BroadcastBus,
}

impl ConfigStore {
    /// Open (creating if absent) a store rooted at `data_dir`, with its own
    /// fresh broadcast bus. Use [`ConfigStore::with_bus`] to share a bus
    /// across stores in the same process (tests simulating multiple tabs).
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_bus(data_dir, BroadcastBus::new()).await
    }

    pub async fn with_bus(data_dir: impl Into<PathBuf>, bus: BroadcastBus) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| EngineError::StorageIo(format!("create data dir: {e}")))?;
        Ok(ConfigStore { data_dir, bus })
    }

    pub fn bus(&self) -> BroadcastBus {
        self.bus.clone()
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", safe_storage_key(key)))
    }

    fn profile_key(name: &str) -> String {
        format!("profiles.{name}")
    }

    // ---- low-level key-value primitives ----

    async fn read_key<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.key_path(key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                validate_file_size(meta.len(), MAX_DOCUMENT_BYTES)
                    .map_err(|e| EngineError::StorageIo(e.to_string()))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::StorageIo(e.to_string())),
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::StorageIo(e.to_string()))?;
        let value: T = secure_json_parse(&content, MAX_DOCUMENT_BYTES as usize)
            .map_err(|e| EngineError::StorageIo(format!("parse {key}: {e}")))?;
        Ok(Some(value))
    }

    async fn write_key<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.key_path(key);
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| EngineError::StorageIo(format!("serialize {key}: {e}")))?;
        if content.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(EngineError::StorageQuota(key.to_string()));
        }
        Self::write_file_locked(&path, &content)
            .await
            .map_err(|e| EngineError::StorageIo(e.to_string()))
    }

    async fn delete_key(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::StorageIo(e.to_string())),
        }
    }

    /// Write `content` to `path` via lock-then-tempfile-then-rename so a
    /// reader never observes a partial write and two concurrent writers
    /// serialize to last-write-wins.
    async fn write_file_locked(path: &Path, content: &str) -> std::io::Result<()> {
        let path = path.to_path_buf();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || {
            let lock_file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&path)?;
            lock_file.lock_exclusive()?;

            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let base = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("data.json");
            let mut counter = 0u32;
            let tmp_path = loop {
                let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
                match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                    Ok(mut tmp) => {
                        tmp.write_all(content.as_bytes())?;
                        tmp.flush()?;
                        let _ = tmp.sync_all();
                        break candidate;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        counter = counter.saturating_add(1);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            fs::rename(&tmp_path, &path)?;
            if let Ok(dir_file) = File::open(dir) {
                let _ = dir_file.sync_all();
            }
            drop(lock_file);
            Ok(())
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }

    // ---- ConfigStore contract (spec.md §4.1 / §6) ----

    /// The currently active profile, normalized.
    pub async fn get_config(&self) -> Result<Profile> {
        let name = self
            .read_key::<String>("currentProfile")
            .await?
            .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());
        match self.read_key::<Profile>(&Self::profile_key(&name)).await? {
            Some(p) => Ok(p.normalized()),
            None => self.create_default_profile().await,
        }
    }

    /// Persist `config` under `profile_name`. If it is the active profile and
    /// the serialized value differs from what was stored, broadcasts
    /// `profileChanged` (origins `inline` and `panel` both route through
    /// this same call).
    pub async fn save_config(
        &self,
        profile_name: &str,
        config: Profile,
        origin: Origin,
        exclude_tab_id: Option<TabId>,
    ) -> Result<()> {
        let config = config.normalized();
        let key = Self::profile_key(profile_name);
        let previous = self.read_key::<Profile>(&key).await?;
        let changed = previous.as_ref() != Some(&config);
        self.write_key(&key, &config).await?;

        let active = self
            .read_key::<String>("currentProfile")
            .await?
            .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());
        if changed && active == profile_name {
            self.bus.broadcast(
                BusMessage::ProfileChanged {
                    profile_name: profile_name.to_string(),
                    origin,
                },
                exclude_tab_id,
            );
        }
        Ok(())
    }

    /// Make `profile_name` active and notify every tab but `exclude_tab_id`.
    pub async fn switch_profile(
        &self,
        profile_name: &str,
        exclude_tab_id: Option<TabId>,
        origin: Origin,
    ) -> Result<Profile> {
        let profile = self
            .read_key::<Profile>(&Self::profile_key(profile_name))
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(profile_name.to_string()))?
            .normalized();
        self.write_key("currentProfile", &profile_name.to_string())
            .await?;
        self.bus.broadcast(
            BusMessage::ProfileChanged {
                profile_name: profile_name.to_string(),
                origin,
            },
            exclude_tab_id,
        );
        Ok(profile)
    }

    /// Create (or overwrite) the canonical `Default` profile and return it.
    /// Does not change which profile is active.
    pub async fn create_default_profile(&self) -> Result<Profile> {
        let profile = Profile::default_named();
        self.write_key(&Self::profile_key(DEFAULT_PROFILE_NAME), &profile)
            .await?;
        Ok(profile)
    }

    /// Delete a profile. A no-op for `Default`, which can never be deleted.
    /// If the active profile is deleted, switches to `Default` first.
    pub async fn delete_profile(&self, name: &str) -> Result<()> {
        if name == DEFAULT_PROFILE_NAME {
            return Ok(());
        }
        let active = self
            .read_key::<String>("currentProfile")
            .await?
            .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());
        if active == name {
            if self
                .read_key::<Profile>(&Self::profile_key(DEFAULT_PROFILE_NAME))
                .await?
                .is_none()
            {
                self.create_default_profile().await?;
            }
            self.write_key("currentProfile", &DEFAULT_PROFILE_NAME.to_string())
                .await?;
        }
        self.delete_key(&Self::profile_key(name)).await
    }

    /// Every persisted profile name.
    pub async fn list_profiles(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| EngineError::StorageIo(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EngineError::StorageIo(e.to_string()))?
        {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                // profile keys are percent-encoded "profiles.<name>"
                if let Some(rest) = stem.strip_prefix("profiles%2E") {
                    names.push(percent_decode(rest));
                }
            }
        }
        names.sort();
        Ok(names)
    }

    // ---- global settings ----

    pub async fn get_global_settings(&self) -> Result<GlobalSettings> {
        Ok(self
            .read_key::<GlobalSettings>("globalSettings")
            .await?
            .unwrap_or_default())
    }

    pub async fn save_global_settings(&self, settings: &GlobalSettings) -> Result<()> {
        self.write_key("globalSettings", settings).await
    }

    /// Persist just the token-approximator sub-settings and notify every tab.
    pub async fn save_token_approximator_settings(
        &self,
        settings: crate::config::TokenApproximatorSettings,
    ) -> Result<()> {
        let mut global = self.get_global_settings().await?;
        global.token_approximator = settings;
        self.save_global_settings(&global).await?;
        self.bus
            .broadcast(BusMessage::TokenApproximatorSettingsChanged, None);
        Ok(())
    }

    // ---- floating panel (per-hostname) ----

    pub async fn get_floating_panel_settings(&self, hostname: &str) -> Result<FloatingPanelSettings> {
        Ok(self
            .read_key(&format!("floatingPanel.{hostname}"))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_floating_panel_settings(
        &self,
        hostname: &str,
        settings: &FloatingPanelSettings,
    ) -> Result<()> {
        self.write_key(&format!("floatingPanel.{hostname}"), settings)
            .await
    }

    pub async fn reset_floating_panel_settings_for_hostname(&self, hostname: &str) -> Result<()> {
        self.delete_key(&format!("floatingPanel.{hostname}")).await
    }

    /// Reset every known hostname's floating-panel settings.
    pub async fn reset_floating_panel_settings(&self) -> Result<()> {
        for hostname in self.get_floating_panel_hostnames().await? {
            self.reset_floating_panel_settings_for_hostname(&hostname)
                .await?;
        }
        Ok(())
    }

    pub async fn get_floating_panel_hostnames(&self) -> Result<Vec<String>> {
        let mut hostnames = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| EngineError::StorageIo(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EngineError::StorageIo(e.to_string()))?
        {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Some(rest) = stem.strip_prefix("floatingPanel%2E") {
                    hostnames.push(percent_decode(rest));
                }
            }
        }
        hostnames.sort();
        Ok(hostnames)
    }

    // ---- per-site custom selectors ----

    pub async fn get_custom_selectors(&self, site: &str) -> Result<CustomSelectors> {
        Ok(self
            .read_key(&format!("customSelectors.{site}"))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_custom_selectors(&self, site: &str, selectors: &CustomSelectors) -> Result<()> {
        self.write_key(&format!("customSelectors.{site}"), selectors)
            .await
    }

    pub async fn reset_advanced_selectors(&self, site: &str) -> Result<()> {
        self.delete_key(&format!("customSelectors.{site}")).await
    }

    // ---- cross-chat prompt clipboard ----

    pub async fn save_stored_prompt(&self, prompt_text: &str) -> Result<()> {
        log::debug!(
            "storing cross-chat prompt clipboard: '{}'",
            crate::logutil::escape_log(prompt_text)
        );
        self.write_key("storedPrompt", &prompt_text.to_string())
            .await
    }

    pub async fn get_stored_prompt(&self) -> Result<Option<String>> {
        self.read_key("storedPrompt").await
    }

    pub async fn clear_stored_prompt(&self) -> Result<()> {
        self.delete_key("storedPrompt").await
    }

    // ---- one-shot legacy migration ----

    /// Migrate a legacy key-value namespace into this store exactly once.
    /// Verifies every migrated key round-trips with strict equality before
    /// reporting success; never clears the caller's source on mismatch.
    /// Returns `false` without writing anything if migration already ran.
    pub async fn migrate_legacy(&self, legacy: &HashMap<String, Value>) -> Result<bool> {
        if self
            .read_key::<bool>("migrationComplete")
            .await?
            .unwrap_or(false)
        {
            return Ok(false);
        }

        for (key, value) in legacy {
            self.write_key(key, value).await?;
        }

        for (key, value) in legacy {
            let stored: Option<Value> = self.read_key(key).await?;
            if stored.as_ref() != Some(value) {
                warn!("legacy migration verification failed for key {key}; not marking complete");
                return Ok(false);
            }
        }

        self.write_key("migrationComplete", &true).await?;
        Ok(true)
    }
}

/// Reverse of `percent_encoding::utf8_percent_encode(_, NON_ALPHANUMERIC)` for
/// the restricted alphabet this store actually produces (letters, digits,
/// and `%XX` escapes); sufficient for recovering hostnames/profile names we
/// wrote ourselves.
fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}
