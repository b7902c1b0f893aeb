//! DPoP key pairs over a multi-algorithm key abstraction.
//!
//! The algorithm configuration is a tagged union, so invalid
//! algorithm/parameter combinations are unrepresentable in the typed API;
//! [`DpopAlgorithm::from_parts`] covers dynamic configuration and rejects
//! unknown pairs before any key material is generated. The private half of a
//! pair exposes no key material: it cannot be serialized, its `Debug` output
//! is redacted, and the only thing it can do is sign proofs.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{ConfigurationError, Result};
use crate::jose::jwk::Jwk;

/// NIST curves supported for ECDSA keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EcdsaCurve {
    #[default]
    P256,
    P384,
    P521,
}

impl EcdsaCurve {
    pub fn name(self) -> &'static str {
        match self {
            EcdsaCurve::P256 => "P-256",
            EcdsaCurve::P384 => "P-384",
            EcdsaCurve::P521 => "P-521",
        }
    }
}

/// Modulus lengths supported for RSA-PSS key generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RsaModulusBits {
    #[default]
    Rsa2048,
    Rsa3072,
    Rsa4096,
}

impl RsaModulusBits {
    pub fn bits(self) -> usize {
        match self {
            RsaModulusBits::Rsa2048 => 2048,
            RsaModulusBits::Rsa3072 => 3072,
            RsaModulusBits::Rsa4096 => 4096,
        }
    }
}

/// Digests usable with RSA signatures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RsaDigest {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

/// RSA signature schemes. Generated pairs always use PSS with SHA-256;
/// PKCS#1 v1.5 is reachable only through [`DpopKeyPair::from_rsa_key`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RsaSignatureScheme {
    Pss(RsaDigest),
    Pkcs1(RsaDigest),
}

/// Supported algorithm configurations for key generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DpopAlgorithm {
    Ecdsa(EcdsaCurve),
    RsaPss(RsaModulusBits),
    Ed25519,
}

impl Default for DpopAlgorithm {
    fn default() -> Self {
        DpopAlgorithm::Ecdsa(EcdsaCurve::P256)
    }
}

impl DpopAlgorithm {
    /// Resolve an `(algorithm, curveOrModulus)` pair from dynamic
    /// configuration, rejecting unsupported combinations with a
    /// `Configuration` error naming the valid set.
    pub fn from_parts(algorithm: &str, curve_or_modulus: &str) -> Result<Self> {
        let invalid = || {
            ConfigurationError::UnsupportedAlgorithmParameter {
                algorithm: algorithm.into(),
                curve_or_modulus: curve_or_modulus.into(),
            }
            .into()
        };
        match algorithm {
            "ECDSA" => match curve_or_modulus {
                "P-256" => Ok(DpopAlgorithm::Ecdsa(EcdsaCurve::P256)),
                "P-384" => Ok(DpopAlgorithm::Ecdsa(EcdsaCurve::P384)),
                "P-521" => Ok(DpopAlgorithm::Ecdsa(EcdsaCurve::P521)),
                _ => Err(invalid()),
            },
            "RSA-PSS" => match curve_or_modulus {
                "2048" => Ok(DpopAlgorithm::RsaPss(RsaModulusBits::Rsa2048)),
                "3072" => Ok(DpopAlgorithm::RsaPss(RsaModulusBits::Rsa3072)),
                "4096" => Ok(DpopAlgorithm::RsaPss(RsaModulusBits::Rsa4096)),
                _ => Err(invalid()),
            },
            "EdDSA" => match curve_or_modulus {
                "Ed25519" => Ok(DpopAlgorithm::Ed25519),
                _ => Err(invalid()),
            },
            _ => Err(ConfigurationError::UnsupportedAlgorithm {
                algorithm: algorithm.into(),
            }
            .into()),
        }
    }
}

/// JWS `alg` identifiers this crate can emit.
///
/// The EdDSA name follows the WebCrypto-era convention of `Ed25519` rather
/// than the JOSE registry's `EdDSA`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwsAlgorithm {
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "ES384")]
    Es384,
    #[serde(rename = "ES512")]
    Es512,
    #[serde(rename = "PS256")]
    Ps256,
    #[serde(rename = "PS384")]
    Ps384,
    #[serde(rename = "PS512")]
    Ps512,
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "RS384")]
    Rs384,
    #[serde(rename = "RS512")]
    Rs512,
    #[serde(rename = "Ed25519")]
    Ed25519,
}

impl JwsAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            JwsAlgorithm::Es256 => "ES256",
            JwsAlgorithm::Es384 => "ES384",
            JwsAlgorithm::Es512 => "ES512",
            JwsAlgorithm::Ps256 => "PS256",
            JwsAlgorithm::Ps384 => "PS384",
            JwsAlgorithm::Ps512 => "PS512",
            JwsAlgorithm::Rs256 => "RS256",
            JwsAlgorithm::Rs384 => "RS384",
            JwsAlgorithm::Rs512 => "RS512",
            JwsAlgorithm::Ed25519 => "Ed25519",
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// p521's VerifyingKey carries no Debug impl, so the containers format
// themselves by algorithm name instead of deriving.
#[derive(Clone)]
pub(crate) enum PublicKeyInner {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    P521(p521::ecdsa::VerifyingKey),
    Rsa {
        key: rsa::RsaPublicKey,
        scheme: RsaSignatureScheme,
    },
    Ed25519(ed25519_dalek::VerifyingKey),
}

/// Exportable public half of a DPoP key pair.
#[derive(Clone)]
pub struct DpopPublicKey {
    pub(crate) inner: PublicKeyInner,
}

impl fmt::Debug for DpopPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DpopPublicKey({})", self.jws_algorithm())
    }
}

impl DpopPublicKey {
    /// JWS algorithm derived from the key's type and parameters.
    pub fn jws_algorithm(&self) -> JwsAlgorithm {
        match &self.inner {
            PublicKeyInner::P256(_) => JwsAlgorithm::Es256,
            PublicKeyInner::P384(_) => JwsAlgorithm::Es384,
            PublicKeyInner::P521(_) => JwsAlgorithm::Es512,
            PublicKeyInner::Rsa { scheme, .. } => match scheme {
                RsaSignatureScheme::Pss(RsaDigest::Sha256) => JwsAlgorithm::Ps256,
                RsaSignatureScheme::Pss(RsaDigest::Sha384) => JwsAlgorithm::Ps384,
                RsaSignatureScheme::Pss(RsaDigest::Sha512) => JwsAlgorithm::Ps512,
                RsaSignatureScheme::Pkcs1(RsaDigest::Sha256) => JwsAlgorithm::Rs256,
                RsaSignatureScheme::Pkcs1(RsaDigest::Sha384) => JwsAlgorithm::Rs384,
                RsaSignatureScheme::Pkcs1(RsaDigest::Sha512) => JwsAlgorithm::Rs512,
            },
            PublicKeyInner::Ed25519(_) => JwsAlgorithm::Ed25519,
        }
    }

    /// Minimal public JWK: RSA exports `kty,e,n`; EC `kty,crv,x,y`;
    /// OKP `kty,crv,x`.
    pub fn to_jwk(&self) -> Jwk {
        match &self.inner {
            PublicKeyInner::P256(vk) => {
                let point = vk.as_affine().to_encoded_point(false);
                Jwk::ec("P-256", encode_coord(point.x().map(|x| x.as_slice())), encode_coord(point.y().map(|y| y.as_slice())))
            }
            PublicKeyInner::P384(vk) => {
                let point = vk.as_affine().to_encoded_point(false);
                Jwk::ec("P-384", encode_coord(point.x().map(|x| x.as_slice())), encode_coord(point.y().map(|y| y.as_slice())))
            }
            PublicKeyInner::P521(vk) => {
                let point = vk.as_affine().to_encoded_point(false);
                Jwk::ec("P-521", encode_coord(point.x().map(|x| x.as_slice())), encode_coord(point.y().map(|y| y.as_slice())))
            }
            PublicKeyInner::Rsa { key, .. } => Jwk::rsa(
                URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()).into(),
                URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()).into(),
            ),
            PublicKeyInner::Ed25519(vk) => {
                Jwk::okp("Ed25519", URL_SAFE_NO_PAD.encode(vk.as_bytes()).into())
            }
        }
    }

    /// RFC 7638 thumbprint of the key's canonical JWK.
    pub fn thumbprint(&self) -> Result<SmolStr> {
        self.to_jwk().thumbprint()
    }
}

fn encode_coord(bytes: Option<&[u8]>) -> SmolStr {
    let bytes = bytes.expect("uncompressed point has affine coordinates");
    URL_SAFE_NO_PAD.encode(bytes).into()
}

pub(crate) enum PrivateKeyInner {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
    Rsa {
        key: rsa::RsaPrivateKey,
        scheme: RsaSignatureScheme,
    },
    Ed25519(ed25519_dalek::SigningKey),
}

/// Non-exportable private half of a DPoP key pair: no serialization, no key
/// material in `Debug` output, sign-only.
pub struct DpopPrivateKey {
    pub(crate) inner: PrivateKeyInner,
}

impl fmt::Debug for DpopPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DpopPrivateKey(<redacted>)")
    }
}

/// Asymmetric key pair restricted to signing DPoP proofs.
///
/// Create one per client session with [`DpopKeyPair::generate`] and reuse it
/// for every proof in that session; the engine never persists or rotates it.
#[derive(Debug)]
pub struct DpopKeyPair {
    public_key: DpopPublicKey,
    private_key: DpopPrivateKey,
}

impl DpopKeyPair {
    /// Generate a fresh key pair for the given algorithm configuration.
    pub fn generate(algorithm: DpopAlgorithm) -> Result<Self> {
        let (public, private) = match algorithm {
            DpopAlgorithm::Ecdsa(EcdsaCurve::P256) => {
                let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
                (PublicKeyInner::P256(*sk.verifying_key()), PrivateKeyInner::P256(sk))
            }
            DpopAlgorithm::Ecdsa(EcdsaCurve::P384) => {
                let sk = p384::ecdsa::SigningKey::random(&mut OsRng);
                (PublicKeyInner::P384(*sk.verifying_key()), PrivateKeyInner::P384(sk))
            }
            DpopAlgorithm::Ecdsa(EcdsaCurve::P521) => {
                let sk = p521::ecdsa::SigningKey::random(&mut OsRng);
                // p521 0.13 gates `verifying_key` behind an undeclared
                // feature; the From conversion is always available.
                let vk = p521::ecdsa::VerifyingKey::from(&sk);
                (PublicKeyInner::P521(vk), PrivateKeyInner::P521(sk))
            }
            DpopAlgorithm::RsaPss(modulus) => {
                let key = rsa::RsaPrivateKey::new(&mut OsRng, modulus.bits())
                    .map_err(ConfigurationError::RsaKeyGeneration)?;
                let scheme = RsaSignatureScheme::Pss(RsaDigest::Sha256);
                (
                    PublicKeyInner::Rsa { key: key.to_public_key(), scheme },
                    PrivateKeyInner::Rsa { key, scheme },
                )
            }
            DpopAlgorithm::Ed25519 => {
                let sk = ed25519_dalek::SigningKey::generate(&mut OsRng);
                (PublicKeyInner::Ed25519(sk.verifying_key()), PrivateKeyInner::Ed25519(sk))
            }
        };
        Ok(Self {
            public_key: DpopPublicKey { inner: public },
            private_key: DpopPrivateKey { inner: private },
        })
    }

    /// Like [`generate`](Self::generate), but offloaded to a blocking worker
    /// so RSA key generation cannot stall the async caller. Must be called
    /// within a tokio runtime.
    pub async fn generate_async(algorithm: DpopAlgorithm) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::generate(algorithm))
            .await
            .map_err(ConfigurationError::from)?
    }

    /// Wrap an externally held RSA key. This is the entry point for
    /// RS256-family and PS384/PS512 signatures; moduli under 2048 bits are
    /// rejected.
    pub fn from_rsa_key(key: rsa::RsaPrivateKey, scheme: RsaSignatureScheme) -> Result<Self> {
        let bits = key.size() * 8;
        if bits < 2048 {
            return Err(ConfigurationError::RsaModulusTooSmall { bits }.into());
        }
        Ok(Self {
            public_key: DpopPublicKey {
                inner: PublicKeyInner::Rsa { key: key.to_public_key(), scheme },
            },
            private_key: DpopPrivateKey {
                inner: PrivateKeyInner::Rsa { key, scheme },
            },
        })
    }

    pub fn public_key(&self) -> &DpopPublicKey {
        &self.public_key
    }

    pub(crate) fn private_key(&self) -> &DpopPrivateKey {
        &self.private_key
    }

    /// JWS algorithm this pair signs with.
    pub fn jws_algorithm(&self) -> JwsAlgorithm {
        self.public_key.jws_algorithm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_algorithm_is_es256() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::default()).unwrap();
        assert_eq!(pair.jws_algorithm(), JwsAlgorithm::Es256);
        let jwk = pair.public_key().to_jwk();
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        assert!(jwk.x.is_some() && jwk.y.is_some());
    }

    #[test]
    fn ecdsa_curves_map_to_jws_algorithms() {
        let p384 = DpopKeyPair::generate(DpopAlgorithm::Ecdsa(EcdsaCurve::P384)).unwrap();
        assert_eq!(p384.jws_algorithm(), JwsAlgorithm::Es384);
        let p521 = DpopKeyPair::generate(DpopAlgorithm::Ecdsa(EcdsaCurve::P521)).unwrap();
        assert_eq!(p521.jws_algorithm(), JwsAlgorithm::Es512);
    }

    #[test]
    fn ed25519_exports_okp_jwk() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::Ed25519).unwrap();
        assert_eq!(pair.jws_algorithm(), JwsAlgorithm::Ed25519);
        let jwk = pair.public_key().to_jwk();
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv.as_deref(), Some("Ed25519"));
        assert!(jwk.x.is_some());
        assert!(jwk.y.is_none());
    }

    #[test]
    fn generated_rsa_is_ps256() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::RsaPss(RsaModulusBits::Rsa2048)).unwrap();
        assert_eq!(pair.jws_algorithm(), JwsAlgorithm::Ps256);
        let jwk = pair.public_key().to_jwk();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
    }

    #[test]
    fn imported_rsa_below_2048_is_rejected() {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let err = DpopKeyPair::from_rsa_key(key, RsaSignatureScheme::Pkcs1(RsaDigest::Sha256))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::OAuthError::Configuration(
                ConfigurationError::RsaModulusTooSmall { bits: 1024 }
            )
        ));
    }

    #[test]
    fn from_parts_accepts_supported_combinations() {
        assert_eq!(
            DpopAlgorithm::from_parts("ECDSA", "P-384").unwrap(),
            DpopAlgorithm::Ecdsa(EcdsaCurve::P384)
        );
        assert_eq!(
            DpopAlgorithm::from_parts("RSA-PSS", "3072").unwrap(),
            DpopAlgorithm::RsaPss(RsaModulusBits::Rsa3072)
        );
        assert_eq!(
            DpopAlgorithm::from_parts("EdDSA", "Ed25519").unwrap(),
            DpopAlgorithm::Ed25519
        );
    }

    #[test]
    fn from_parts_rejects_invalid_combinations() {
        assert!(DpopAlgorithm::from_parts("ECDSA", "2048").is_err());
        assert!(DpopAlgorithm::from_parts("RSA-PSS", "P-256").is_err());
        assert!(DpopAlgorithm::from_parts("HMAC", "P-256").is_err());
    }

    #[tokio::test]
    async fn generate_async_yields_a_working_pair() {
        let pair = DpopKeyPair::generate_async(DpopAlgorithm::default()).await.unwrap();
        assert_eq!(pair.jws_algorithm(), JwsAlgorithm::Es256);
        assert!(pair.public_key().thumbprint().is_ok());
    }

    #[test]
    fn private_key_debug_is_redacted() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::default()).unwrap();
        assert_eq!(format!("{:?}", pair.private_key()), "DpopPrivateKey(<redacted>)");
    }
}
