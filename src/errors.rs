//! # Error Types Module
//!
//! Error taxonomy shared by the session core. Every variant renders to
//! exactly one localized, user-facing message; the internal detail is kept
//! for logs.

use thiserror::Error;

use crate::localization::{t_args_lang, t_lang};
use crate::session::SessionState;

/// Errors surfaced by the orchestrator and its collaborators
#[derive(Debug, Clone, Error)]
pub enum BotError {
    /// Invalid attachment type, oversized file, missing target. Carries the
    /// message key of the reason.
    #[error("invalid input: {0}")]
    UserInput(String),
    /// The acting user does not own the session or record
    #[error("user {actor} does not own this session")]
    Ownership { actor: u64 },
    /// Session not found or past its TTL
    #[error("session {0} not found or expired")]
    SessionExpired(String),
    /// Remote provider failure (submission, poll or fetch)
    #[error("provider error: {0}")]
    Provider(String),
    /// Remote job did not finish within the attempt ceiling
    #[error("provider job timed out after {attempts} attempts")]
    ProviderTimeout { attempts: u32 },
    /// Read-back after a session write did not match the intended values
    #[error("session {0} failed write verification")]
    VerificationFailed(String),
    /// The action kind is over its limit
    #[error("rate limited, retry in {retry_after_minutes} minute(s)")]
    RateLimited { retry_after_minutes: u64 },
    /// The session is not in a state that allows the requested transition
    #[error("invalid transition from {from:?}")]
    InvalidTransition { from: SessionState },
    /// Persistence collaborator failure
    #[error("storage error: {0}")]
    Storage(String),
    /// Chat transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl BotError {
    pub fn user_input(reason_key: &str) -> Self {
        BotError::UserInput(reason_key.to_string())
    }

    /// Chat transport failure from a plain HTTP call. The request URL is
    /// dropped: chat file URLs carry the bot token.
    pub fn transport_http(err: reqwest::Error) -> Self {
        BotError::Transport(err.without_url().to_string())
    }

    /// Short machine-friendly label used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::UserInput(_) => "user_input",
            BotError::Ownership { .. } => "ownership",
            BotError::SessionExpired(_) => "session_expired",
            BotError::Provider(_) => "provider",
            BotError::ProviderTimeout { .. } => "provider_timeout",
            BotError::VerificationFailed(_) => "verification_failed",
            BotError::RateLimited { .. } => "rate_limited",
            BotError::InvalidTransition { .. } => "invalid_transition",
            BotError::Storage(_) => "storage",
            BotError::Transport(_) => "transport",
        }
    }

    /// Localized message shown to the user
    pub fn user_message(&self, language_code: Option<&str>) -> String {
        match self {
            BotError::UserInput(reason_key) => {
                let reason = t_lang(reason_key, language_code);
                t_args_lang("error-user-input", &[("reason", &reason)], language_code)
            }
            BotError::Ownership { .. } => t_lang("error-not-owner", language_code),
            BotError::SessionExpired(_) => t_lang("error-session-expired", language_code),
            BotError::Provider(message) if !message.is_empty() => {
                t_args_lang("error-provider", &[("message", message)], language_code)
            }
            BotError::Provider(_) => t_lang("error-provider-generic", language_code),
            BotError::ProviderTimeout { .. } => t_lang("error-provider-timeout", language_code),
            BotError::VerificationFailed(_) => t_lang("error-session-invalidated", language_code),
            BotError::RateLimited {
                retry_after_minutes,
            } => t_args_lang(
                "error-rate-limited",
                &[("minutes", &retry_after_minutes.to_string())],
                language_code,
            ),
            BotError::InvalidTransition { .. } => t_lang("error-already-processing", language_code),
            BotError::Storage(_) | BotError::Transport(_) => {
                t_lang("error-generic", language_code)
            }
        }
    }
}

impl From<sqlx::Error> for BotError {
    fn from(err: sqlx::Error) -> Self {
        BotError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Provider(err.without_url().to_string())
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BotError::RateLimited {
            retry_after_minutes: 8,
        };
        assert_eq!(err.to_string(), "rate limited, retry in 8 minute(s)");

        let err = BotError::ProviderTimeout { attempts: 60 };
        assert_eq!(err.to_string(), "provider job timed out after 60 attempts");
    }

    #[tokio::test]
    async fn test_http_errors_hide_request_url() {
        // Nothing listens on the discard port, so the request fails to connect
        let url = "http://127.0.0.1:9/file/bot123456:SECRET-TOKEN/photos/a.jpg";
        let client = reqwest::Client::builder().no_proxy().build().unwrap();

        let err = client.get(url).send().await.unwrap_err();
        let transport = BotError::transport_http(err);
        assert!(matches!(transport, BotError::Transport(_)));
        assert!(!transport.to_string().contains("SECRET-TOKEN"));

        let err = client.get(url).send().await.unwrap_err();
        let provider = BotError::from(err);
        assert!(matches!(provider, BotError::Provider(_)));
        assert!(!provider.to_string().contains("SECRET-TOKEN"));
    }

    #[test]
    fn test_rate_limited_message_mentions_minutes() {
        let err = BotError::RateLimited {
            retry_after_minutes: 8,
        };
        assert!(err.user_message(Some("en")).contains('8'));
    }
}
