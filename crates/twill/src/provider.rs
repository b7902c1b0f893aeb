use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;

use crate::error::{BoxError, TokenProviderError};

/// Token scheme the server issued the access token under. Determines how
/// the client proves possession on each request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TokenType {
    #[default]
    Bearer,
    Dpop,
}

impl TokenType {
    /// Canonical scheme name for the `Authorization` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Bearer => "Bearer",
            TokenType::Dpop => "DPoP",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = TokenProviderError;

    // Case-insensitive: servers disagree on "DPoP" vs "dpop" capitalization.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("bearer") {
            Ok(TokenType::Bearer)
        } else if s.eq_ignore_ascii_case("dpop") {
            Ok(TokenType::Dpop)
        } else {
            Err(TokenProviderError::UnsupportedTokenType {
                token_type: s.into(),
            })
        }
    }
}

/// What a [`TokenProvider`] hands back. Field validation is deferred so a
/// provider can forward a raw token endpoint response without pre-checking.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: SmolStr,
    #[serde(default)]
    pub token_type: SmolStr,
}

impl TokenResponse {
    pub fn new(access_token: impl Into<SmolStr>, token_type: impl Into<SmolStr>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
        }
    }

    pub fn bearer(access_token: impl Into<SmolStr>) -> Self {
        Self::new(access_token, "Bearer")
    }

    pub fn dpop(access_token: impl Into<SmolStr>) -> Self {
        Self::new(access_token, "DPoP")
    }

    /// Parsed token type, distinguishing a missing field from an
    /// unrecognized one.
    pub fn token_type(&self) -> Result<TokenType, TokenProviderError> {
        if self.token_type.is_empty() {
            return Err(TokenProviderError::MissingTokenType);
        }
        self.token_type.parse()
    }

    pub(crate) fn validated(self) -> Result<(SmolStr, TokenType), TokenProviderError> {
        if self.access_token.is_empty() {
            return Err(TokenProviderError::MissingAccessToken);
        }
        let token_type = self.token_type()?;
        Ok((self.access_token, token_type))
    }
}

/// Supplies an access token for each protected request. The client never
/// caches or refreshes tokens itself, so implementations own that policy
/// (fetch once, refresh on expiry, read from a session store, ...).
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Result<TokenResponse, BoxError>;
}

#[async_trait::async_trait]
impl TokenProvider for TokenResponse {
    async fn get_token(&self) -> Result<TokenResponse, BoxError> {
        Ok(self.clone())
    }
}
