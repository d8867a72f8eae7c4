//! Wires [`EngineRequest`]/[`EngineResponse`] onto [`ConfigStore`] and the
//! two host capabilities spec.md §6 requires but this crate can't implement
//! itself: opening the settings page, and fanning a prompt out to other
//! tabs' clipboards.
//!
//! This is the one piece of the message contract with actual behavior
//! attached; `messages` itself is just the wire shape.

use async_trait::async_trait;

use crate::broadcast::{Origin, TabId};
use crate::config::store::ConfigStore;
use crate::errors::EngineError;
use crate::messages::{CrossChatFanoutResult, EngineRequest, EngineResponse};

/// Opens the host's settings page. A no-op in this crate's test harness;
/// a real host would open its options URL.
#[async_trait]
pub trait SettingsPageOpener: Send + Sync {
    async fn open_settings_page(&self);
}

/// Fans a prompt out to every other tab's stored-prompt clipboard, counting
/// outcomes the way spec.md's `triggerDangerCrossChatSend` message does.
#[async_trait]
pub trait CrossChatSender: Send + Sync {
    async fn send_to_other_tabs(&self, prompt_text: &str, exclude_tab_id: Option<TabId>) -> CrossChatFanoutResult;
}

/// A `CrossChatSender` for a single-tab harness: every send is trivially
/// "skipped" since there are no other tabs to reach.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOtherTabsCrossChatSender;

#[async_trait]
impl CrossChatSender for NoOtherTabsCrossChatSender {
    async fn send_to_other_tabs(&self, _prompt_text: &str, _exclude_tab_id: Option<TabId>) -> CrossChatFanoutResult {
        CrossChatFanoutResult { ok: 0, failed: 0, skipped: 0 }
    }
}

pub struct EngineDispatcher {
    store: ConfigStore,
    settings_page: Box<dyn SettingsPageOpener>,
    cross_chat: Box<dyn CrossChatSender>,
}

impl EngineDispatcher {
    pub fn new(store: ConfigStore, settings_page: Box<dyn SettingsPageOpener>, cross_chat: Box<dyn CrossChatSender>) -> Self {
        EngineDispatcher { store, settings_page, cross_chat }
    }

    /// Handle one request, with `tab_id` as the calling tab's identity (used
    /// to exclude it from broadcasts and cross-chat fan-out it initiated).
    pub async fn dispatch(&self, request: EngineRequest, tab_id: Option<TabId>) -> EngineResponse {
        match request {
            EngineRequest::GetConfig => self.result_to_response(self.store.get_config().await, |config| {
                EngineResponse::Config { config }
            }),
            EngineRequest::SaveConfig { profile_name, config } => {
                let origin = Origin::Panel;
                self.result_to_response(
                    self.store.save_config(&profile_name, config, origin, tab_id).await,
                    |()| EngineResponse::Success { success: true },
                )
            }
            EngineRequest::SwitchProfile { profile_name, origin } => self.result_to_response(
                self.store.switch_profile(&profile_name, tab_id, origin).await,
                |config| EngineResponse::Config { config },
            ),
            EngineRequest::ListProfiles => self.result_to_response(self.store.list_profiles().await, |profiles| {
                EngineResponse::Profiles { profiles }
            }),
            EngineRequest::DeleteProfile { profile_name } => self.result_to_response(
                self.store.delete_profile(&profile_name).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::CreateDefaultProfile => {
                self.result_to_response(self.store.create_default_profile().await, |config| {
                    EngineResponse::Config { config }
                })
            }
            EngineRequest::GetGlobalSettings => {
                self.result_to_response(self.store.get_global_settings().await, |settings| {
                    EngineResponse::GlobalSettings { settings }
                })
            }
            EngineRequest::SaveGlobalSettings { settings } => self.result_to_response(
                self.store.save_global_settings(&settings).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::GetCustomSelectors { site } => {
                self.result_to_response(self.store.get_custom_selectors(&site).await, |selectors| {
                    EngineResponse::CustomSelectors { selectors }
                })
            }
            EngineRequest::SaveCustomSelectors { site, selectors } => self.result_to_response(
                self.store.save_custom_selectors(&site, &selectors).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::ResetAdvancedSelectors { site } => self.result_to_response(
                self.store.reset_advanced_selectors(&site).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::GetFloatingPanelSettings { hostname } => self.result_to_response(
                self.store.get_floating_panel_settings(&hostname).await,
                |settings| EngineResponse::FloatingPanelSettings { settings },
            ),
            EngineRequest::SaveFloatingPanelSettings { hostname, settings } => self.result_to_response(
                self.store.save_floating_panel_settings(&hostname, &settings).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::ResetFloatingPanelSettings => self.result_to_response(
                self.store.reset_floating_panel_settings().await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::ResetFloatingPanelSettingsForHostname { hostname } => self.result_to_response(
                self.store.reset_floating_panel_settings_for_hostname(&hostname).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::GetFloatingPanelHostnames => self.result_to_response(
                self.store.get_floating_panel_hostnames().await,
                |hostnames| EngineResponse::FloatingPanelHostnames { hostnames },
            ),
            EngineRequest::GetTokenApproximatorSettings => {
                self.result_to_response(self.store.get_global_settings().await, |settings| {
                    EngineResponse::TokenApproximatorSettings {
                        settings: settings.token_approximator,
                    }
                })
            }
            EngineRequest::SaveTokenApproximatorSettings { settings } => self.result_to_response(
                self.store.save_token_approximator_settings(settings).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::GetInlineProfileSelectorSettings => {
                self.result_to_response(self.store.get_global_settings().await, |settings| {
                    EngineResponse::InlineProfileSelectorSettings {
                        enabled: settings.inline_profile_selector_enabled,
                    }
                })
            }
            EngineRequest::SaveInlineProfileSelectorSettings { enabled } => {
                let mut settings = match self.store.get_global_settings().await {
                    Ok(s) => s,
                    Err(e) => return EngineResponse::Error { error: e.to_string() },
                };
                settings.inline_profile_selector_enabled = enabled;
                self.result_to_response(
                    self.store.save_global_settings(&settings).await,
                    |()| EngineResponse::Success { success: true },
                )
            }
            EngineRequest::SaveStoredPrompt { prompt_text } => self.result_to_response(
                self.store.save_stored_prompt(&prompt_text).await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::GetStoredPrompt => {
                self.result_to_response(self.store.get_stored_prompt().await, |prompt_text| {
                    EngineResponse::StoredPrompt { prompt_text }
                })
            }
            EngineRequest::ClearStoredPrompt => self.result_to_response(
                self.store.clear_stored_prompt().await,
                |()| EngineResponse::Success { success: true },
            ),
            EngineRequest::TriggerDangerCrossChatSend { prompt_text } => {
                let result = self.cross_chat.send_to_other_tabs(&prompt_text, tab_id).await;
                EngineResponse::CrossChatFanout { result }
            }
            EngineRequest::OpenSettingsPage => {
                self.settings_page.open_settings_page().await;
                EngineResponse::SettingsPageOpened
            }
        }
    }

    fn result_to_response<T>(&self, result: Result<T, EngineError>, ok: impl FnOnce(T) -> EngineResponse) -> EngineResponse {
        match result {
            Ok(value) => ok(value),
            Err(e) => {
                log::warn!("request failed: {e}");
                EngineResponse::Error { error: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoopSettingsPage {
        opened: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SettingsPageOpener for NoopSettingsPage {
        async fn open_settings_page(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn dispatcher() -> (EngineDispatcher, tempfile::TempDir, Arc<AtomicUsize>) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).await.unwrap();
        let opened = Arc::new(AtomicUsize::new(0));
        let dispatcher = EngineDispatcher::new(
            store,
            Box::new(NoopSettingsPage { opened: opened.clone() }),
            Box::new(NoOtherTabsCrossChatSender),
        );
        (dispatcher, dir, opened)
    }

    #[tokio::test]
    async fn get_config_returns_default_profile() {
        let (dispatcher, _dir, _opened) = dispatcher().await;
        let response = dispatcher.dispatch(EngineRequest::GetConfig, None).await;
        match response {
            EngineResponse::Config { config } => assert_eq!(config.name, "Default"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_then_switch_then_list_profiles() {
        let (dispatcher, _dir, _opened) = dispatcher().await;
        let mut work = Profile::default_named();
        work.name = "Work".to_string();

        let response = dispatcher
            .dispatch(
                EngineRequest::SaveConfig { profile_name: "Work".to_string(), config: work },
                None,
            )
            .await;
        assert!(matches!(response, EngineResponse::Success { success: true }));

        let response = dispatcher
            .dispatch(
                EngineRequest::SwitchProfile { profile_name: "Work".to_string(), origin: Origin::Panel },
                None,
            )
            .await;
        assert!(matches!(response, EngineResponse::Config { config } if config.name == "Work"));

        let response = dispatcher.dispatch(EngineRequest::ListProfiles, None).await;
        match response {
            EngineResponse::Profiles { mut profiles } => {
                profiles.sort();
                assert_eq!(profiles, vec!["Default".to_string(), "Work".to_string()]);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_unknown_profile_returns_success_noop() {
        let (dispatcher, _dir, _opened) = dispatcher().await;
        let response = dispatcher
            .dispatch(EngineRequest::DeleteProfile { profile_name: "Ghost".to_string() }, None)
            .await;
        assert!(matches!(response, EngineResponse::Success { success: true }));
    }

    #[tokio::test]
    async fn switch_to_unknown_profile_surfaces_error_response() {
        let (dispatcher, _dir, _opened) = dispatcher().await;
        let response = dispatcher
            .dispatch(
                EngineRequest::SwitchProfile { profile_name: "Ghost".to_string(), origin: Origin::Inline },
                None,
            )
            .await;
        assert!(matches!(response, EngineResponse::Error { .. }));
    }

    #[tokio::test]
    async fn open_settings_page_invokes_host_capability() {
        let (dispatcher, _dir, opened) = dispatcher().await;
        let response = dispatcher.dispatch(EngineRequest::OpenSettingsPage, None).await;
        assert!(matches!(response, EngineResponse::SettingsPageOpened));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cross_chat_fanout_uses_host_sender() {
        let (dispatcher, _dir, _opened) = dispatcher().await;
        let response = dispatcher
            .dispatch(EngineRequest::TriggerDangerCrossChatSend { prompt_text: "hi".to_string() }, None)
            .await;
        match response {
            EngineResponse::CrossChatFanout { result } => {
                assert_eq!(result, CrossChatFanoutResult { ok: 0, failed: 0, skipped: 0 })
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stored_prompt_round_trips_through_dispatch() {
        let (dispatcher, _dir, _opened) = dispatcher().await;
        dispatcher
            .dispatch(EngineRequest::SaveStoredPrompt { prompt_text: "draft".to_string() }, None)
            .await;
        let response = dispatcher.dispatch(EngineRequest::GetStoredPrompt, None).await;
        assert!(matches!(response, EngineResponse::StoredPrompt { prompt_text: Some(ref p) } if p == "draft"));
    }
}
