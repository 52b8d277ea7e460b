//! Session configuration.
//!
//! Every field has a default so a partial (or empty) `config.toml` is valid.

use serde::{Deserialize, Serialize};

/// Discovery service tag shared by every Interpay device.
pub const DEFAULT_SERVICE_TYPE: &str = "interpay-mpc";

/// Fallback display name when the host name is unavailable.
pub const DEFAULT_DISPLAY_NAME: &str = "interpay-device";

/// Top-level configuration for a peer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Service tag advertised and browsed for on the local network.
    pub service_type: String,
    /// Human-readable name of the local peer.
    pub display_name: String,
    /// How long an outgoing invitation waits for an answer.
    pub invite_timeout_secs: u64,
    /// Retry a failed payment-request send once before reporting it.
    pub retry_failed_send: bool,
    /// Number of recently received payment-request ids remembered for
    /// duplicate suppression. Zero disables it.
    pub dedup_window: usize,
    /// Invitation trust policy.
    pub trust: TrustConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            display_name: default_display_name(),
            invite_timeout_secs: 10,
            retry_failed_send: true,
            dedup_window: 256,
            trust: TrustConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Config for a named local peer with every other field defaulted.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }
}

/// Which peers the session invites and accepts invitations from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Invite every discovered peer and accept every invitation.
    pub auto_accept: bool,
    /// Peer ids or display names to trust. When non-empty, only these
    /// peers are invited or accepted.
    pub allow_list: Vec<String>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            auto_accept: true,
            allow_list: Vec::new(),
        }
    }
}

fn default_display_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
}
