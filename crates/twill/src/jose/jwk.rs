use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{ConfigurationError, Result};
use crate::utils::hash_to_base64url_sha256;

/// Minimal public JWK: only the members needed for embedding in a DPoP proof
/// header and for RFC 7638 thumbprints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<SmolStr>,
}

impl Jwk {
    pub fn ec(crv: &str, x: SmolStr, y: SmolStr) -> Self {
        Jwk {
            kty: "EC".into(),
            crv: Some(crv.into()),
            x: Some(x),
            y: Some(y),
            n: None,
            e: None,
        }
    }

    pub fn rsa(n: SmolStr, e: SmolStr) -> Self {
        Jwk {
            kty: "RSA".into(),
            crv: None,
            x: None,
            y: None,
            n: Some(n),
            e: Some(e),
        }
    }

    pub fn okp(crv: &str, x: SmolStr) -> Self {
        Jwk {
            kty: "OKP".into(),
            crv: Some(crv.into()),
            x: Some(x),
            y: None,
            n: None,
            e: None,
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the canonical JSON of the required
    /// members in lexicographic order (RSA: `e,kty,n`; EC: `crv,kty,x,y`;
    /// OKP: `crv,kty,x`), base64url-encoded.
    ///
    /// Member values are base64url strings, so the canonical form can be
    /// assembled without a JSON serializer in the way.
    pub fn thumbprint(&self) -> Result<SmolStr> {
        let canonical = match self.kty.as_str() {
            "RSA" => {
                let (Some(e), Some(n)) = (&self.e, &self.n) else {
                    return Err(ConfigurationError::IncompleteJwk.into());
                };
                format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#)
            }
            "EC" => {
                let (Some(crv), Some(x), Some(y)) = (&self.crv, &self.x, &self.y) else {
                    return Err(ConfigurationError::IncompleteJwk.into());
                };
                format!(r#"{{"crv":"{crv}","kty":"EC","x":"{x}","y":"{y}"}}"#)
            }
            "OKP" => {
                let (Some(crv), Some(x)) = (&self.crv, &self.x) else {
                    return Err(ConfigurationError::IncompleteJwk.into());
                };
                format!(r#"{{"crv":"{crv}","kty":"OKP","x":"{x}"}}"#)
            }
            other => {
                return Err(ConfigurationError::UnsupportedKeyType { kty: other.into() }.into());
            }
        };
        Ok(hash_to_base64url_sha256(&canonical))
    }
}
