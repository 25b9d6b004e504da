//! Load keys and cache-busting

use crate::error::LoadError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Query parameter carrying the refresh token
pub const REFRESH_PARAM: &str = "v";

/// Opaque value that forces a reload of the same URL when it changes.
///
/// Hosts pass a counter, a build hash or any other text; it is compared by
/// equality and sent verbatim as `v=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "RawToken")]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Token with the given text
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RefreshToken {
    fn default() -> Self {
        Self::from(0_u64)
    }
}

impl Display for RefreshToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RefreshToken {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RefreshToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RefreshToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<RefreshToken> for String {
    fn from(token: RefreshToken) -> Self {
        token.0
    }
}

/// Wire form: hosts send either a number or a string
#[derive(Deserialize)]
#[serde(untagged)]
enum RawToken {
    Number(u64),
    Text(String),
}

impl From<RawToken> for RefreshToken {
    fn from(raw: RawToken) -> Self {
        match raw {
            RawToken::Number(n) => Self::from(n),
            RawToken::Text(text) => Self(text),
        }
    }
}

/// `url` with `v=<token>` set, replacing any earlier `v`
///
/// # Errors
/// [`LoadError::InvalidUrl`] for relative or non-http(s) URLs.
pub fn cache_busted_url(url: &str, token: &RefreshToken) -> Result<String, LoadError> {
    let mut parsed = Url::parse(url).map_err(|e| LoadError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != REFRESH_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(REFRESH_PARAM, token.as_str());
    Ok(parsed.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn appends_token() {
        assert_eq!(
            cache_busted_url("http://cdn.test/artifacts/ab.js", &RefreshToken::from(3_u64)).unwrap(),
            "http://cdn.test/artifacts/ab.js?v=3"
        );
    }

    #[test]
    fn replaces_previous_token_and_keeps_other_params() {
        assert_eq!(
            cache_busted_url("http://cdn.test/a.js?x=1&v=2", &RefreshToken::from(9_u64)).unwrap(),
            "http://cdn.test/a.js?x=1&v=9"
        );
    }

    #[test]
    fn rejects_relative_and_foreign_urls() {
        assert!(matches!(
            cache_busted_url("/artifacts/a.js", &RefreshToken::from(0_u64)),
            Err(LoadError::InvalidUrl { .. })
        ));
        assert!(matches!(
            cache_busted_url("file:///tmp/a.js", &RefreshToken::from(0_u64)),
            Err(LoadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn text_tokens_are_sent_verbatim() {
        let token = RefreshToken::from("01J9ZQ7X4K");
        assert_eq!(
            cache_busted_url("http://cdn.test/a.js", &token).unwrap(),
            "http://cdn.test/a.js?v=01J9ZQ7X4K"
        );
    }

    #[test]
    fn numbers_and_strings_deserialize() {
        let number: RefreshToken = serde_json::from_str("7").unwrap();
        let text: RefreshToken = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(number, RefreshToken::from(7_u64));
        assert_eq!(text, RefreshToken::from("abc123"));
        assert_eq!(serde_json::to_string(&number).unwrap(), "\"7\"");
    }

    proptest! {
        #[test]
        fn exactly_one_token(first in any::<u64>(), second in any::<u64>()) {
            let once = cache_busted_url("https://cdn.test/a.js", &RefreshToken::from(first)).unwrap();
            let twice = cache_busted_url(&once, &RefreshToken::from(second)).unwrap();
            prop_assert_eq!(twice.matches("v=").count(), 1);
            let expected = format!("v={second}");
            prop_assert!(twice.ends_with(&expected));
        }
    }
}
