//! Profile invariants enforced by `ConfigStore::save_config` (via the
//! message dispatcher, so these exercise the same path a host process
//! would), plus the quota failure mode.

use queue_engine::config::store::ConfigStore;
use queue_engine::config::{CustomButton, Profile};
use queue_engine::dispatch::{EngineDispatcher, NoOtherTabsCrossChatSender, SettingsPageOpener};
use queue_engine::messages::{EngineRequest, EngineResponse};

use async_trait::async_trait;

struct NoopSettingsPage;
#[async_trait]
impl SettingsPageOpener for NoopSettingsPage {
    async fn open_settings_page(&self) {}
}

async fn dispatcher_over_temp_store() -> (EngineDispatcher, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::open(dir.path()).await.unwrap();
    (
        EngineDispatcher::new(store, Box::new(NoopSettingsPage), Box::new(NoOtherTabsCrossChatSender)),
        dir,
    )
}

#[tokio::test]
async fn hide_activation_toggle_forces_queue_mode_off_after_save() {
    let (dispatcher, _dir) = dispatcher_over_temp_store().await;

    let mut profile = Profile::default_named();
    profile.enable_queue_mode = true;
    profile.queue_hide_activation_toggle = true;

    let response = dispatcher
        .dispatch(
            EngineRequest::SaveConfig { profile_name: "Default".to_string(), config: profile },
            None,
        )
        .await;
    assert!(matches!(response, EngineResponse::Success { success: true }));

    let response = dispatcher.dispatch(EngineRequest::GetConfig, None).await;
    match response {
        EngineResponse::Config { config } => {
            assert!(config.queue_hide_activation_toggle);
            assert!(!config.enable_queue_mode, "save must enforce the hide-toggle invariant");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn numeric_delay_fields_are_clamped_on_save_and_read() {
    let (dispatcher, _dir) = dispatcher_over_temp_store().await;

    let mut profile = Profile::default_named();
    profile.queue_delay_minutes = 0; // below the 1..=64000 range
    profile.queue_randomize_percent = 500; // above the 0..=100 range

    dispatcher
        .dispatch(
            EngineRequest::SaveConfig { profile_name: "Default".to_string(), config: profile },
            None,
        )
        .await;

    let response = dispatcher.dispatch(EngineRequest::GetConfig, None).await;
    match response {
        EngineResponse::Config { config } => {
            assert_eq!(config.queue_delay_minutes, 1);
            assert_eq!(config.queue_randomize_percent, 100);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn oversized_profile_is_rejected_as_storage_quota() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::open(dir.path()).await.unwrap();

    let mut profile = Profile::default_named();
    // Each button serializes to well over 40 bytes of JSON; comfortably
    // clears the store's 1MB per-document cap in a few tens of thousands.
    for i in 0..40_000 {
        profile.custom_buttons.push(CustomButton::Button {
            icon: "✨".to_string(),
            text: format!("prompt number {i} with some extra padding text"),
            auto_send: true,
            tooltip: None,
        });
    }

    let err = store.save_config("Default", profile, queue_engine::broadcast::Origin::Panel, None).await;
    assert!(
        matches!(err, Err(queue_engine::errors::EngineError::StorageQuota(_))),
        "expected StorageQuota, got {err:?}"
    );
}
