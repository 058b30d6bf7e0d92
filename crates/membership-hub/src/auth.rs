//! Bearer credentials for Hub requests
//!
//! Credential discovery lives outside this crate. Anything that can mint an
//! access token for a scope implements [`TokenSource`].

use async_trait::async_trait;
use membership_common::{Error, Result};

/// Provides bearer tokens for Hub requests
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return an access token valid for `scope`
    async fn token(&self, scope: &str) -> Result<String>;
}

/// A pre-minted access token
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wrap an access token; surrounding whitespace is trimmed
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(Error::config("access token is empty"));
        }
        Ok(Self { token })
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self, _scope: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_trims_whitespace() {
        let source = StaticToken::new("  ya29.token\n").unwrap();
        assert_eq!(source.token("scope").await.unwrap(), "ya29.token");
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(StaticToken::new(" \n"), Err(Error::Config { .. })));
    }

    #[test]
    fn debug_output_redacts_token() {
        let source = StaticToken::new("secret-value").unwrap();
        assert!(!format!("{source:?}").contains("secret-value"));
    }
}
