use http::{Method, StatusCode};
use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;
use url::Url;

use crate::body::ResponseBody;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors emitted by the client, inspected by kind rather than by subclass.
///
/// Configuration and TokenProvider failures always fire before any network
/// I/O for the affected request.
#[derive(Debug, Error, Diagnostic)]
pub enum OAuthError {
    /// Bad or missing client/key setup; always caller-fixable.
    #[error("configuration error: {0}")]
    #[diagnostic(code(twill::configuration))]
    Configuration(#[from] ConfigurationError),

    /// The token provider returned nothing usable, or failed during
    /// acquisition. Provider failures are surfaced unmodified as the source.
    #[error("token provider error: {0}")]
    #[diagnostic(
        code(twill::token_provider),
        help("check the provider's credentials and its get_token implementation")
    )]
    TokenProvider(#[from] TokenProviderError),

    /// The server returned a non-2xx status.
    #[error("[{method}] request to [{url}] returned {status} status code ({status_text})")]
    #[diagnostic(
        code(twill::response),
        help("inspect `status` and `body` for the server's error payload")
    )]
    Response {
        status: StatusCode,
        status_text: SmolStr,
        /// Best-effort parse of the error body.
        body: Option<ResponseBody>,
        url: Url,
        method: Method,
    },

    /// A 2xx response whose body could not be decoded per its declared
    /// content type. The call worked; the body was malformed.
    #[error("failed to parse the response body")]
    #[diagnostic(code(twill::response_parse))]
    ResponseParse {
        #[source]
        source: BoxError,
        /// Raw body, when it was at least valid UTF-8.
        raw: Option<String>,
    },

    /// Transport-level failure, including abort/cancellation.
    #[error("request transport error")]
    #[diagnostic(code(twill::request))]
    Request(#[source] BoxError),
}

pub type Result<T> = core::result::Result<T, OAuthError>;

/// Invalid or missing setup, named by the violated constraint.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigurationError {
    #[error("a token provider is required for protected resources")]
    #[diagnostic(
        code(twill::configuration::token_provider),
        help("pass a provider at construction time or override one per call")
    )]
    MissingTokenProvider,

    #[error("a DPoP key pair is required for protected resources with the DPoP token type")]
    #[diagnostic(code(twill::configuration::dpop_key_pair))]
    MissingDpopKeyPair,

    #[error("unsupported algorithm `{algorithm}`; supported algorithms are: ECDSA, RSA-PSS, EdDSA")]
    #[diagnostic(code(twill::configuration::algorithm))]
    UnsupportedAlgorithm { algorithm: SmolStr },

    #[error(
        "unsupported parameter `{curve_or_modulus}` for {algorithm}; valid combinations are \
         ECDSA with P-256/P-384/P-521, RSA-PSS with 2048/3072/4096, EdDSA with Ed25519"
    )]
    #[diagnostic(code(twill::configuration::algorithm_parameter))]
    UnsupportedAlgorithmParameter {
        algorithm: SmolStr,
        curve_or_modulus: SmolStr,
    },

    #[error("RSA key modulus must be at least 2048 bits, got {bits}")]
    #[diagnostic(code(twill::configuration::rsa_modulus))]
    RsaModulusTooSmall { bits: usize },

    #[error("RSA key generation failed")]
    #[diagnostic(code(twill::configuration::rsa_keygen))]
    RsaKeyGeneration(#[from] rsa::Error),

    #[error("key generation task failed")]
    #[diagnostic(code(twill::configuration::keygen_task))]
    KeyGenerationTask(#[from] tokio::task::JoinError),

    #[error("unsupported public key type `{kty}`; supported types are: RSA, EC, OKP")]
    #[diagnostic(code(twill::configuration::key_type))]
    UnsupportedKeyType { kty: SmolStr },

    #[error("JWK is missing required members for its key type")]
    #[diagnostic(code(twill::configuration::jwk))]
    IncompleteJwk,

    #[error("signing failed")]
    #[diagnostic(code(twill::configuration::signing))]
    Signing(#[source] signature::Error),

    #[error("failed to serialize JOSE structure")]
    #[diagnostic(code(twill::configuration::serde))]
    Serialization(#[from] serde_json::Error),

    #[error("invalid request url")]
    #[diagnostic(code(twill::configuration::url))]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid value for header `{name}`")]
    #[diagnostic(code(twill::configuration::header))]
    InvalidHeader {
        name: SmolStr,
        #[source]
        source: http::header::InvalidHeaderValue,
    },

    #[error("failed to build http request")]
    #[diagnostic(code(twill::configuration::http_build))]
    HttpBuild(#[from] http::Error),

    #[error("request body cannot be encoded as {content_type}")]
    #[diagnostic(code(twill::configuration::body))]
    UnsupportedBody { content_type: SmolStr },

    #[error("failed to url-encode request body")]
    #[diagnostic(code(twill::configuration::form))]
    FormEncoding(#[from] serde_html_form::ser::Error),

    #[error("PKCE code verifier length must be between 43 and 128 characters, got {length}")]
    #[diagnostic(
        code(twill::configuration::pkce),
        help("PKCE must use S256 with a 43..=128 character verifier (RFC 7636)")
    )]
    PkceVerifierLength { length: usize },

    #[error("PKCE code verifier must be a non-empty string")]
    #[diagnostic(code(twill::configuration::pkce))]
    PkceEmptyVerifier,
}

/// The provider broke its contract, or token acquisition itself failed.
#[derive(Debug, Error, Diagnostic)]
pub enum TokenProviderError {
    #[error("token provider didn't return an access_token")]
    #[diagnostic(code(twill::token_provider::access_token))]
    MissingAccessToken,

    #[error("token provider didn't return a token_type")]
    #[diagnostic(code(twill::token_provider::token_type))]
    MissingTokenType,

    #[error("token provider returned an unsupported token type `{token_type}`; supported types are: Bearer, DPoP")]
    #[diagnostic(code(twill::token_provider::unsupported_type))]
    UnsupportedTokenType { token_type: SmolStr },

    #[error("token acquisition failed")]
    #[diagnostic(code(twill::token_provider::acquisition))]
    Acquisition(#[source] BoxError),
}
