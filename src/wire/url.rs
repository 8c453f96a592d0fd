//! Redirect target validation.

use thiserror::Error;

/// Schemes accepted for external redirects without further vouching.
pub const ALLOWED_SCHEMES: &[&str] = &[
    "http", "https", "ftp", "ftps", "mailto", "news", "irc", "gopher", "nntp", "feed", "telnet",
    "mms", "rtsp", "svn", "tel", "fax", "xmpp",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("local redirect {to:?} must begin with a single '/'")]
    NotLocalPath { to: String },
    #[error("local redirect {to:?} may not contain a backslash")]
    BackslashInPath { to: String },
    #[error("external redirect {url:?} has no scheme")]
    MissingScheme { url: String },
    #[error("redirect scheme {scheme:?} is not in the allowed set")]
    DisallowedScheme { scheme: String },
}

/// A local redirect must begin with a single `/` (not `//`, which is a
/// protocol-relative URL) and contain no backslash.
pub fn validate_local(to: &str) -> Result<(), UrlError> {
    if !to.starts_with('/') || to.starts_with("//") {
        return Err(UrlError::NotLocalPath { to: to.to_string() });
    }
    if to.contains('\\') {
        return Err(UrlError::BackslashInPath { to: to.to_string() });
    }
    Ok(())
}

/// An external redirect must carry a scheme from the allowed set.
pub fn validate_external(url: &str) -> Result<(), UrlError> {
    let scheme = scheme_of(url)?;
    if ALLOWED_SCHEMES.contains(&scheme.as_str()) {
        Ok(())
    } else {
        Err(UrlError::DisallowedScheme { scheme })
    }
}

/// Shape check for vouched-for external redirects: any scheme, but there
/// must be one.
pub fn require_scheme(url: &str) -> Result<(), UrlError> {
    scheme_of(url).map(|_| ())
}

fn scheme_of(url: &str) -> Result<String, UrlError> {
    let (scheme, _) = url.split_once(':').ok_or_else(|| UrlError::MissingScheme {
        url: url.to_string(),
    })?;
    let valid = !scheme.is_empty()
        && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        Ok(scheme.to_ascii_lowercase())
    } else {
        Err(UrlError::MissingScheme {
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_rules() {
        assert!(validate_local("/").is_ok());
        assert!(validate_local("/users/1?tab=a").is_ok());
        assert!(validate_local("//evil.example").is_err());
        assert!(validate_local("relative/path").is_err());
        assert!(validate_local("/with\\backslash").is_err());
        assert!(validate_local("").is_err());
    }

    #[test]
    fn external_whitelist() {
        assert!(validate_external("https://example.com/x").is_ok());
        assert!(validate_external("MAILTO:a@example.com").is_ok());
        assert!(validate_external("tel:+1555").is_ok());
        assert_eq!(
            validate_external("javascript:alert(1)"),
            Err(UrlError::DisallowedScheme {
                scheme: "javascript".to_string()
            })
        );
        assert!(validate_external("no-scheme-here").is_err());
    }

    #[test]
    fn trusted_redirects_still_need_a_scheme() {
        assert!(require_scheme("steam://run/440").is_ok());
        assert!(require_scheme("not a url").is_err());
    }
}
