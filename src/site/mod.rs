//! Per-site adapter contract.
//!
//! A `SiteAdapter` is the engine's one collaborator outside this crate's
//! control: it owns text injection, cursor placement, and clicking the
//! page's send control. This module only describes the trait boundary and
//! the finite set of sites the engine recognizes; DOM selectors and the
//! concrete adapters belong to the host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The finite set of chat sites the engine ships adapters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteId {
    ChatGpt,
    Claude,
    Copilot,
    DeepSeek,
    AiStudio,
    Grok,
    Gemini,
    Perplexity,
}

impl SiteId {
    /// Derive a site from a host domain, if recognized.
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.to_ascii_lowercase();
        Some(match () {
            _ if host.contains("chatgpt.com") || host.contains("chat.openai.com") => SiteId::ChatGpt,
            _ if host.contains("claude.ai") => SiteId::Claude,
            _ if host.contains("copilot.microsoft.com") => SiteId::Copilot,
            _ if host.contains("chat.deepseek.com") => SiteId::DeepSeek,
            _ if host.contains("aistudio.google.com") => SiteId::AiStudio,
            _ if host.contains("grok.com") || host.contains("x.ai") => SiteId::Grok,
            _ if host.contains("gemini.google.com") => SiteId::Gemini,
            _ if host.contains("perplexity.ai") => SiteId::Perplexity,
            _ => return None,
        })
    }
}

/// Per-site selector directory, normally populated by the host and
/// overridable per-site via [`crate::config::CustomSelectors`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selectors {
    pub editors: Vec<String>,
    pub send_buttons: Vec<String>,
    pub thread_root: String,
    pub buttons_container_id: String,
    pub containers: Vec<String>,
}

/// Outcome of a dispatch attempt, mirroring the adapter's wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Text was injected and the send control was clicked.
    Sent,
    /// The editor or send control could not be located.
    NotFound,
    /// The site blocked the click (rate limit, disabled control).
    Blocked,
    /// Text was injected but the caller must click send manually (autoSend=false).
    Manual,
}

/// The per-site capability the scheduler invokes on every dispatch. Always
/// called with `auto_send = true` by `SchedulerHandle`; `autoSend = false` is
/// reachable only through the host's direct (non-queued) button click.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    async fn send(&self, text: &str, auto_send: bool) -> DispatchOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_host_recognizes_known_sites() {
        assert_eq!(SiteId::from_host("chatgpt.com"), Some(SiteId::ChatGpt));
        assert_eq!(SiteId::from_host("claude.ai"), Some(SiteId::Claude));
        assert_eq!(SiteId::from_host("unknown.example.com"), None);
    }
}
