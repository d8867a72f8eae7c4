//! # Configuration & Profile types
//!
//! Defines the data persisted by [`store::ConfigStore`]: a named [`Profile`]
//! bundling button layout and queue behavior, and a single shared
//! [`GlobalSettings`] record. Both are plain serde-derived types; validation
//! lives on [`Profile::normalized`] rather than at deserialization time, so a
//! profile written by an older version of the engine still loads.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use queue_engine::config::store::ConfigStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = ConfigStore::open("./data").await?;
//!     let profile = store.get_config().await?;
//!     println!("active profile: {}", profile.name);
//!     Ok(())
//! }
//! ```

pub mod store;

use serde::{Deserialize, Serialize};

/// Unit in which a profile's queue delay is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Min,
    Sec,
}

impl Default for DelayUnit {
    fn default() -> Self {
        DelayUnit::Min
    }
}

/// One entry in a profile's button bar: either a clickable prompt button or a
/// visual separator between groups of buttons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomButton {
    Separator {
        separator: bool,
    },
    Button {
        icon: String,
        text: String,
        #[serde(default)]
        auto_send: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tooltip: Option<String>,
    },
}

/// A named, persisted bundle of per-user configuration affecting buttons and
/// queue behavior. Exactly one profile is active at a time (tracked by
/// `ConfigStore`, not by this type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub custom_buttons: Vec<CustomButton>,
    #[serde(default)]
    pub global_auto_send_enabled: bool,
    #[serde(default = "default_true")]
    pub enable_shortcuts: bool,
    #[serde(default)]
    pub enable_queue_mode: bool,
    #[serde(default)]
    pub queue_delay_unit: DelayUnit,
    #[serde(default = "default_delay_minutes")]
    pub queue_delay_minutes: u32,
    #[serde(default = "default_delay_seconds")]
    pub queue_delay_seconds: u32,
    #[serde(default)]
    pub queue_randomize_enabled: bool,
    #[serde(default = "default_randomize_percent")]
    pub queue_randomize_percent: u32,
    #[serde(default)]
    pub queue_hide_activation_toggle: bool,
    #[serde(default)]
    pub queue_auto_scroll_before_send: bool,
    #[serde(default)]
    pub queue_beep_before_send: bool,
    #[serde(default)]
    pub queue_speak_before_send: bool,
    #[serde(default)]
    pub queue_beep_on_finish: bool,
}

fn default_true() -> bool {
    true
}
fn default_delay_minutes() -> u32 {
    5
}
fn default_delay_seconds() -> u32 {
    300
}
fn default_randomize_percent() -> u32 {
    5
}

pub const QUEUE_DELAY_MINUTES_RANGE: std::ops::RangeInclusive<u32> = 1..=64_000;
pub const QUEUE_DELAY_SECONDS_RANGE: std::ops::RangeInclusive<u32> = 10..=64_000;
pub const QUEUE_RANDOMIZE_PERCENT_RANGE: std::ops::RangeInclusive<u32> = 0..=100;

impl Profile {
    /// The canonical default profile, named `Default`.
    pub fn default_named() -> Self {
        Profile {
            name: "Default".to_string(),
            custom_buttons: Vec::new(),
            global_auto_send_enabled: false,
            enable_shortcuts: true,
            enable_queue_mode: false,
            queue_delay_unit: DelayUnit::Min,
            queue_delay_minutes: default_delay_minutes(),
            queue_delay_seconds: default_delay_seconds(),
            queue_randomize_enabled: false,
            queue_randomize_percent: default_randomize_percent(),
            queue_hide_activation_toggle: false,
            queue_auto_scroll_before_send: false,
            queue_beep_before_send: false,
            queue_speak_before_send: false,
            queue_beep_on_finish: false,
        }
    }

    /// Clamp numeric fields into range and enforce the hide-toggle invariant.
    /// Called on both read and write so a profile persisted by an older or
    /// hand-edited document can never violate the engine's invariants.
    pub fn normalized(mut self) -> Self {
        self.queue_delay_minutes = self
            .queue_delay_minutes
            .clamp(*QUEUE_DELAY_MINUTES_RANGE.start(), *QUEUE_DELAY_MINUTES_RANGE.end());
        self.queue_delay_seconds = self
            .queue_delay_seconds
            .clamp(*QUEUE_DELAY_SECONDS_RANGE.start(), *QUEUE_DELAY_SECONDS_RANGE.end());
        self.queue_randomize_percent = self.queue_randomize_percent.clamp(
            *QUEUE_RANDOMIZE_PERCENT_RANGE.start(),
            *QUEUE_RANDOMIZE_PERCENT_RANGE.end(),
        );
        if self.queue_hide_activation_toggle {
            self.enable_queue_mode = false;
        }
        self
    }

    /// Base delay in milliseconds before jitter, per `queue_delay_unit`.
    pub fn base_delay_ms(&self) -> u64 {
        match self.queue_delay_unit {
            DelayUnit::Sec => self.queue_delay_seconds as u64 * 1000,
            DelayUnit::Min => self.queue_delay_minutes as u64 * 60_000,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::default_named()
    }
}

/// Cross-chat prompt clipboard fan-out settings and acceptance state shared
/// by every profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossChatSettings {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreadMode {
    WithEditors,
    IgnoreEditors,
    Hide,
}

impl Default for ThreadMode {
    fn default() -> Self {
        ThreadMode::WithEditors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChipPlacement {
    Before,
    After,
}

impl Default for ChipPlacement {
    fn default() -> Self {
        ChipPlacement::After
    }
}

/// Token-approximator-specific settings, nested inside [`GlobalSettings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenApproximatorSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub thread_mode: ThreadMode,
    #[serde(default)]
    pub placement: ChipPlacement,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_counting_method")]
    pub counting_method: String,
}

fn default_scale() -> f64 {
    1.0
}
fn default_counting_method() -> String {
    "ultralight-state-machine".to_string()
}

impl Default for TokenApproximatorSettings {
    fn default() -> Self {
        TokenApproximatorSettings {
            enabled: true,
            thread_mode: ThreadMode::default(),
            placement: ChipPlacement::default(),
            scale: default_scale(),
            counting_method: default_counting_method(),
        }
    }
}

/// The single shared record of settings that apply across all profiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub accepted_queue_tos: bool,
    #[serde(default)]
    pub tooltips_enabled: bool,
    #[serde(default)]
    pub token_approximator: TokenApproximatorSettings,
    #[serde(default)]
    pub inline_profile_selector_enabled: bool,
    #[serde(default)]
    pub cross_chat: CrossChatSettings,
}

/// Per-hostname state for the floating control panel (position, collapsed
/// state); keyed by hostname in the store, never by profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatingPanelSettings {
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
}

/// Per-site override of the selector directory described in the engine's
/// external interfaces, keyed by [`crate::site::SiteId`] in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomSelectors {
    #[serde(default)]
    pub editors: Vec<String>,
    #[serde(default)]
    pub send_buttons: Vec<String>,
    #[serde(default)]
    pub thread_root: Option<String>,
    #[serde(default)]
    pub buttons_container_id: Option<String>,
    #[serde(default)]
    pub containers: Vec<String>,
}
