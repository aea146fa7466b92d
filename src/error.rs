// Error type shared by every module of the crate.
// Each variant maps to one failure boundary: local configuration, key
// material, the network, the ASM API itself, or the operator's input.

use reqwest::StatusCode;

/// Unified error for configuration, signing and API failures.
#[derive(Debug, thiserror::Error)]
pub enum AsmError {
    /// Missing environment variable, missing key file or a bad server mapping.
    /// Fatal: the run stops with exit code 1.
    #[error("{0}")]
    Configuration(String),

    /// The private key could not be parsed or the token could not be signed.
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// DNS, TCP, TLS or timeout failure; no HTTP status is available.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered with a non-success status. `body` keeps whatever
    /// diagnostic text the API returned.
    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Operator input that cannot be recovered by re-prompting.
    #[error("{0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AsmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn api_error_keeps_status_and_body() {
        let err = AsmError::Api {
            status: StatusCode::FORBIDDEN,
            body: r#"{"errors":[{"code":"FORBIDDEN_ERROR"}]}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("FORBIDDEN_ERROR"));
    }

    #[test]
    fn configuration_error_displays_message_verbatim() {
        let err = AsmError::Configuration("ASM_KEY_ID environment variable not set".into());
        assert_eq!(err.to_string(), "ASM_KEY_ID environment variable not set");
    }

    #[test]
    fn parse_error_chains_to_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = AsmError::from(json_err);
        assert!(err.to_string().starts_with("failed to parse response"));
        assert!(err.source().is_some());
    }
}
