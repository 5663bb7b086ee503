//! Target URL validation.
//!
//! A target URL must be absolute, use `http` or `https`, and name a host.
//! The URL is validated but never rewritten: the registry stores the spec
//! value verbatim so convergence checks compare like with like.

use url::Url;

/// Reasons a target URL is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetUrlError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Only HTTP and HTTPS protocols are allowed, got '{0}'")]
    UnsupportedProtocol(String),

    #[error("URL has no host")]
    MissingHost,
}

/// Validates a target URL.
///
/// # Errors
///
/// Returns [`TargetUrlError::InvalidFormat`] for strings that do not parse as
/// an absolute URL, [`TargetUrlError::UnsupportedProtocol`] for schemes other
/// than HTTP(S), and [`TargetUrlError::MissingHost`] for an empty host.
///
/// # Examples
///
/// ```ignore
/// assert!(validate_target_url("https://example.com/a").is_ok());
/// assert!(validate_target_url("not-a-url").is_err());
/// assert!(validate_target_url("ftp://example.com").is_err());
/// ```
pub fn validate_target_url(input: &str) -> Result<Url, TargetUrlError> {
    let url = Url::parse(input).map_err(|e| TargetUrlError::InvalidFormat(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(TargetUrlError::UnsupportedProtocol(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(TargetUrlError::MissingHost);
    }

    Ok(url)
}
