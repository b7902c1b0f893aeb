//! The authenticated request engine: header assembly, DPoP proofing,
//! nonce caching, and the single use_dpop_nonce retry.

use std::sync::{Arc, PoisonError, RwLock};

use http::{HeaderMap, HeaderValue, Method, Request, Response, header};
use smol_str::SmolStr;
use url::Url;

use crate::{
    body::{ContentType, EncodedBody, RequestBody, ResponseBody, format_request_body,
        parse_response_body},
    dpop::{self, ProofParams},
    error::{ConfigurationError, OAuthError, Result, TokenProviderError},
    http_client::HttpClient,
    key::DpopKeyPair,
    provider::{TokenProvider, TokenType},
};

const DPOP_HEADER: &str = "DPoP";
const DPOP_NONCE_HEADER: &str = "DPoP-Nonce";

/// Construction-time settings for an [`OAuthClient`].
///
/// `protected`/`public` pick the sensible defaults; the fields stay public
/// for callers assembling a config by hand, and [`OAuthClient::new`]
/// re-validates either way.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub content_type: ContentType,
    /// When true, every request carries an Authorization header (and a DPoP
    /// proof for DPoP-typed tokens) unless overridden per call.
    pub is_protected: bool,
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    pub dpop_key_pair: Option<Arc<DpopKeyPair>>,
}

impl ClientConfig {
    /// Config for an API that requires authentication on every request.
    pub fn protected(base_url: Url, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            base_url,
            content_type: ContentType::default(),
            is_protected: true,
            token_provider: Some(token_provider),
            dpop_key_pair: None,
        }
    }

    /// Config for an API that needs no authentication by default.
    pub fn public(base_url: Url) -> Self {
        Self {
            base_url,
            content_type: ContentType::default(),
            is_protected: false,
            token_provider: None,
            dpop_key_pair: None,
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Key pair used to sign DPoP proofs whenever the provider issues a
    /// DPoP-typed token.
    pub fn with_dpop_key_pair(mut self, key_pair: Arc<DpopKeyPair>) -> Self {
        self.dpop_key_pair = Some(key_pair);
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("content_type", &self.content_type)
            .field("is_protected", &self.is_protected)
            .field("token_provider", &self.token_provider.is_some())
            .field("dpop_key_pair", &self.dpop_key_pair.is_some())
            .finish()
    }
}

/// Per-call overrides. Nothing here mutates the client's base config.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Merged into the request last, so they win over generated headers.
    /// Disabling protection (not header fiddling) is the supported way to
    /// suppress Authorization/DPoP.
    pub headers: HeaderMap,
    /// Override the client-level protection flag for this call.
    pub is_protected: Option<bool>,
    /// Use a different provider for this call.
    pub token_provider: Option<Arc<dyn TokenProvider>>,
}

impl RequestOptions {
    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn public(mut self) -> Self {
        self.is_protected = Some(false);
        self
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = Some(true);
        self
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }
}

/// HTTP client for OAuth-protected (or plain) APIs.
///
/// Handles Bearer and DPoP token types transparently: the provider's
/// `token_type` decides per request whether a proof is attached. The
/// server-issued DPoP nonce is cached across requests, last writer wins;
/// the lock is never held across an await.
pub struct OAuthClient<C: HttpClient> {
    config: ClientConfig,
    nonce: RwLock<Option<SmolStr>>,
    http: C,
}

impl<C: HttpClient> std::fmt::Debug for OAuthClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("config", &self.config)
            .field("nonce", &self.cached_nonce())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "reqwest-client")]
impl OAuthClient<reqwest::Client> {
    pub fn with_default_client(config: ClientConfig) -> Result<Self> {
        Self::new(config, reqwest::Client::new())
    }
}

impl<C: HttpClient> OAuthClient<C> {
    /// Fails with `Configuration` when the config is protected but names
    /// no token provider.
    pub fn new(config: ClientConfig, http: C) -> Result<Self> {
        if config.is_protected && config.token_provider.is_none() {
            return Err(ConfigurationError::MissingTokenProvider.into());
        }
        Ok(Self {
            config,
            nonce: RwLock::new(None),
            http,
        })
    }

    pub async fn get(&self, endpoint: &str, options: Option<RequestOptions>) -> Result<ResponseBody> {
        self.execute(Method::GET, endpoint, None, options).await
    }

    pub async fn delete(
        &self,
        endpoint: &str,
        options: Option<RequestOptions>,
    ) -> Result<ResponseBody> {
        self.execute(Method::DELETE, endpoint, None, options).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        body: Option<RequestBody>,
        options: Option<RequestOptions>,
    ) -> Result<ResponseBody> {
        self.execute(Method::POST, endpoint, body, options).await
    }

    pub async fn put(
        &self,
        endpoint: &str,
        body: Option<RequestBody>,
        options: Option<RequestOptions>,
    ) -> Result<ResponseBody> {
        self.execute(Method::PUT, endpoint, body, options).await
    }

    pub async fn patch(
        &self,
        endpoint: &str,
        body: Option<RequestBody>,
        options: Option<RequestOptions>,
    ) -> Result<ResponseBody> {
        self.execute(Method::PATCH, endpoint, body, options).await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(%method, endpoint))
    )]
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        options: Option<RequestOptions>,
    ) -> Result<ResponseBody> {
        let options = options.unwrap_or_default();
        let url = self
            .config
            .base_url
            .join(endpoint)
            .map_err(ConfigurationError::from)?;

        let encoded = body
            .as_ref()
            .map(|b| format_request_body(b, self.config.content_type))
            .transpose()?;

        let mut headers = HeaderMap::new();
        let content_type = encoded
            .as_ref()
            .map(|e| e.content_type.as_str())
            .unwrap_or(self.config.content_type.mime());
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|source| ConfigurationError::InvalidHeader {
                    name: "content-type".into(),
                    source,
                })?,
        );

        let is_protected = options.is_protected.unwrap_or(self.config.is_protected);
        let auth = if is_protected {
            Some(self.acquire_token(&options).await?)
        } else {
            None
        };

        if let Some((token, token_type)) = &auth {
            headers.insert(
                header::AUTHORIZATION,
                header_value(&format!("{token_type} {token}"), "authorization")?,
            );
            // Fails before any I/O when no key pair was configured.
            if *token_type == TokenType::Dpop && self.config.dpop_key_pair.is_none() {
                return Err(ConfigurationError::MissingDpopKeyPair.into());
            }
        }
        for (name, value) in options.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let needs_proof = matches!(&auth, Some((_, TokenType::Dpop)));
        let request = self.assemble(&method, &url, &headers, &encoded, &auth, needs_proof)?;
        let response = self.dispatch(request).await?;
        self.capture_nonce(&response);

        // RFC 9449 §8: one retry with the server-supplied nonce. The proof
        // is rebuilt from scratch so the retry carries the fresh nonce and
        // a fresh jti.
        let response = if needs_proof
            && !response.status().is_success()
            && dpop::is_use_dpop_nonce_error(&response)
        {
            let retry = self.assemble(&method, &url, &headers, &encoded, &auth, true)?;
            let response = self.dispatch(retry).await?;
            self.capture_nonce(&response);
            response
        } else {
            response
        };

        if response.status().is_success() {
            return parse_response_body(&response);
        }
        let status = response.status();
        Err(OAuthError::Response {
            status,
            status_text: status.canonical_reason().unwrap_or_default().into(),
            body: parse_response_body(&response)
                .ok()
                .filter(|b| *b != ResponseBody::Empty),
            url,
            method,
        })
    }

    async fn acquire_token(&self, options: &RequestOptions) -> Result<(SmolStr, TokenType)> {
        let provider = options
            .token_provider
            .as_ref()
            .or(self.config.token_provider.as_ref())
            .ok_or(ConfigurationError::MissingTokenProvider)?;
        let token = provider
            .get_token()
            .await
            .map_err(TokenProviderError::Acquisition)?;
        Ok(token.validated()?)
    }

    /// Build one request attempt. Proofs are never reused across attempts.
    fn assemble(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        encoded: &Option<EncodedBody>,
        auth: &Option<(SmolStr, TokenType)>,
        needs_proof: bool,
    ) -> Result<Request<Vec<u8>>> {
        let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
        if let Some(header_map) = builder.headers_mut() {
            header_map.extend(headers.iter().map(|(n, v)| (n.clone(), v.clone())));
        }
        let mut request = builder
            .body(encoded.as_ref().map(|e| e.bytes.clone()).unwrap_or_default())
            .map_err(ConfigurationError::from)?;

        if needs_proof {
            let key_pair = self
                .config
                .dpop_key_pair
                .as_ref()
                .ok_or(ConfigurationError::MissingDpopKeyPair)?;
            let access_token = auth.as_ref().map(|(token, _)| token.as_str());
            let proof = dpop::generate_proof(ProofParams {
                url,
                method,
                key_pair,
                nonce: self.cached_nonce(),
                access_token,
            })?;
            // Extra headers stay authoritative even over the proof.
            if !request.headers().contains_key(DPOP_HEADER) {
                request
                    .headers_mut()
                    .insert(DPOP_HEADER, header_value(&proof, DPOP_HEADER)?);
            }
        }
        Ok(request)
    }

    async fn dispatch(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        self.http
            .send_http(request)
            .await
            .map_err(|e| OAuthError::Request(Box::new(e)))
    }

    /// Any response carrying `DPoP-Nonce` updates the cache, success or
    /// not. Last writer wins under concurrency.
    fn capture_nonce(&self, response: &Response<Vec<u8>>) {
        let Some(nonce) = response
            .headers()
            .get(DPOP_NONCE_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        *self
            .nonce
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(nonce.into());
    }

    fn cached_nonce(&self) -> Option<SmolStr> {
        self.nonce
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|source| {
            ConfigurationError::InvalidHeader {
                name: name.into(),
                source,
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokenResponse;

    struct NeverClient;

    impl HttpClient for NeverClient {
        type Error = std::convert::Infallible;

        async fn send_http(
            &self,
            _request: Request<Vec<u8>>,
        ) -> core::result::Result<Response<Vec<u8>>, Self::Error> {
            unreachable!("configuration errors must fire before dispatch")
        }
    }

    fn base_url() -> Url {
        Url::parse("https://api.example.com").unwrap()
    }

    #[test]
    fn protected_config_requires_a_provider() {
        let mut config = ClientConfig::public(base_url());
        config.is_protected = true;
        let err = OAuthClient::new(config, NeverClient).unwrap_err();
        assert!(matches!(
            err,
            OAuthError::Configuration(ConfigurationError::MissingTokenProvider)
        ));
    }

    #[test]
    fn public_config_needs_no_provider() {
        assert!(OAuthClient::new(ClientConfig::public(base_url()), NeverClient).is_ok());
    }

    #[test]
    fn client_debug_summarizes_config() {
        let client = OAuthClient::new(ClientConfig::public(base_url()), NeverClient).unwrap();
        let out = format!("{client:?}");
        assert!(out.starts_with("OAuthClient"));
        assert!(out.contains("is_protected: false"));
    }

    #[tokio::test]
    async fn per_call_protection_without_any_provider_fails_before_dispatch() {
        let client = OAuthClient::new(ClientConfig::public(base_url()), NeverClient).unwrap();
        let err = client
            .get("/widgets", Some(RequestOptions::default().protected()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OAuthError::Configuration(ConfigurationError::MissingTokenProvider)
        ));
    }

    #[tokio::test]
    async fn dpop_token_without_key_pair_fails_before_dispatch() {
        let provider: Arc<dyn TokenProvider> = Arc::new(TokenResponse::dpop("tok"));
        let config = ClientConfig::protected(base_url(), provider);
        let client = OAuthClient::new(config, NeverClient).unwrap();
        let err = client.get("/widgets", None).await.unwrap_err();
        assert!(matches!(
            err,
            OAuthError::Configuration(ConfigurationError::MissingDpopKeyPair)
        ));
    }

    #[tokio::test]
    async fn invalid_endpoint_fails_before_dispatch() {
        let client = OAuthClient::new(ClientConfig::public(base_url()), NeverClient).unwrap();
        let err = client.get("https://[bad", None).await.unwrap_err();
        assert!(matches!(
            err,
            OAuthError::Configuration(ConfigurationError::InvalidUrl(_))
        ));
    }
}
