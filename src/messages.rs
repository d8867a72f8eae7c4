//! The request/response message contract shared across tab and popup
//! process boundaries (spec.md §6).
//!
//! In production this travels over a `chrome.runtime` message port; here it
//! is a plain `serde`-serializable enum pair so any host (a wasm message
//! port, an in-process dispatcher, a test harness) can carry it over
//! whatever transport it has. This crate only exercises it via direct
//! in-process dispatch (see `ConfigStore`'s tests); nothing here assumes a
//! particular wire format beyond "serializable with serde_json".

use serde::{Deserialize, Serialize};

use crate::broadcast::Origin;
use crate::config::{CustomSelectors, FloatingPanelSettings, GlobalSettings, Profile, TokenApproximatorSettings};

/// Every request a host (popup, content script) can send to the
/// `ConfigStore`/engine boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineRequest {
    GetConfig,
    SaveConfig { profile_name: String, config: Profile },
    SwitchProfile { profile_name: String, origin: Origin },
    ListProfiles,
    DeleteProfile { profile_name: String },
    CreateDefaultProfile,
    GetGlobalSettings,
    SaveGlobalSettings { settings: GlobalSettings },
    GetCustomSelectors { site: String },
    SaveCustomSelectors { site: String, selectors: CustomSelectors },
    ResetAdvancedSelectors { site: String },
    GetFloatingPanelSettings { hostname: String },
    SaveFloatingPanelSettings { hostname: String, settings: FloatingPanelSettings },
    ResetFloatingPanelSettings,
    ResetFloatingPanelSettingsForHostname { hostname: String },
    GetFloatingPanelHostnames,
    GetTokenApproximatorSettings,
    SaveTokenApproximatorSettings { settings: TokenApproximatorSettings },
    GetInlineProfileSelectorSettings,
    SaveInlineProfileSelectorSettings { enabled: bool },
    SaveStoredPrompt { prompt_text: String },
    GetStoredPrompt,
    ClearStoredPrompt,
    TriggerDangerCrossChatSend { prompt_text: String },
    OpenSettingsPage,
}

/// The count of per-tab outcomes from a cross-chat fan-out send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChatFanoutResult {
    pub ok: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// The corresponding response variant for each [`EngineRequest`]. Every
/// fallible variant carries `{ error: String }` instead of its success
/// payload rather than a bare `Result`, matching the JSON-shaped contract a
/// real message port would carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineResponse {
    Config { config: Profile },
    Success { success: bool },
    Profiles { profiles: Vec<String> },
    GlobalSettings { settings: GlobalSettings },
    CustomSelectors { selectors: CustomSelectors },
    FloatingPanelSettings { settings: FloatingPanelSettings },
    FloatingPanelHostnames { hostnames: Vec<String> },
    TokenApproximatorSettings { settings: TokenApproximatorSettings },
    InlineProfileSelectorSettings { enabled: bool },
    StoredPrompt { prompt_text: Option<String> },
    CrossChatFanout { result: CrossChatFanoutResult },
    SettingsPageOpened,
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = EngineRequest::SwitchProfile {
            profile_name: "Work".to_string(),
            origin: Origin::Panel,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: EngineRequest = serde_json::from_str(&json).unwrap();
        match back {
            EngineRequest::SwitchProfile { profile_name, origin } => {
                assert_eq!(profile_name, "Work");
                assert_eq!(origin, Origin::Panel);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn response_round_trips_through_json() {
        let resp = EngineResponse::CrossChatFanout {
            result: CrossChatFanoutResult { ok: 2, failed: 1, skipped: 0 },
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: EngineResponse = serde_json::from_str(&json).unwrap();
        match back {
            EngineResponse::CrossChatFanout { result } => {
                assert_eq!(result, CrossChatFanoutResult { ok: 2, failed: 1, skipped: 0 })
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
