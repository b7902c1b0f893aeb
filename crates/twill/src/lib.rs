//! OAuth 2.0 client plumbing for APIs protected by Bearer or DPoP
//! (RFC 9449) access tokens.
//!
//! [`client::OAuthClient`] is the entry point: give it a base URL, a
//! [`provider::TokenProvider`], and (for DPoP) a [`key::DpopKeyPair`], and
//! every request gets the right Authorization header, a fresh proof, and
//! the server's nonce dance handled for it. Token acquisition itself is
//! the provider's job; this crate never caches or refreshes tokens.

pub mod body;
pub mod client;
pub mod dpop;
pub mod error;
pub mod http_client;
pub mod jose;
pub mod key;
pub mod pkce;
pub mod provider;
pub mod utils;

pub use body::{ContentType, RequestBody, ResponseBody};
pub use client::{ClientConfig, OAuthClient, RequestOptions};
pub use error::{OAuthError, Result};
pub use http_client::HttpClient;
pub use key::{DpopAlgorithm, DpopKeyPair, EcdsaCurve, RsaModulusBits};
pub use provider::{TokenProvider, TokenResponse, TokenType};
