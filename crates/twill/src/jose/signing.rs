use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use sha2::{Sha256, Sha384, Sha512};
use signature::{RandomizedSigner, SignatureEncoding, Signer};

use super::{jws::Header, jwt::Claims};
use crate::error::{ConfigurationError, Result};
use crate::key::{DpopPrivateKey, PrivateKeyInner, RsaDigest, RsaSignatureScheme};

/// Sign `base64url(header).base64url(claims)` with the key's
/// algorithm-specific parameters and append the base64url signature,
/// yielding a compact JWT.
pub fn create_signed_jwt(key: &DpopPrivateKey, header: &Header, claims: &Claims) -> Result<String> {
    let header_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_string(header).map_err(ConfigurationError::from)?);
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_string(claims).map_err(ConfigurationError::from)?);
    let input = format!("{header_b64}.{payload_b64}");
    let signature = sign(key, input.as_bytes())?;
    Ok(format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

fn sign(key: &DpopPrivateKey, message: &[u8]) -> Result<Vec<u8>> {
    match &key.inner {
        // ECDSA digests are fixed by the curve: P-256 uses SHA-256, P-384
        // SHA-384, P-521 SHA-512. Signatures are fixed-width r||s.
        PrivateKeyInner::P256(sk) => {
            let sig: p256::ecdsa::Signature =
                sk.try_sign(message).map_err(ConfigurationError::Signing)?;
            Ok(sig.to_bytes().to_vec())
        }
        PrivateKeyInner::P384(sk) => {
            let sig: p384::ecdsa::Signature =
                sk.try_sign(message).map_err(ConfigurationError::Signing)?;
            Ok(sig.to_bytes().to_vec())
        }
        PrivateKeyInner::P521(sk) => {
            let sig: p521::ecdsa::Signature =
                sk.try_sign(message).map_err(ConfigurationError::Signing)?;
            Ok(sig.to_bytes().to_vec())
        }
        PrivateKeyInner::Rsa { key, scheme } => {
            let bits = key.size() * 8;
            if bits < 2048 {
                return Err(ConfigurationError::RsaModulusTooSmall { bits }.into());
            }
            sign_rsa(key, *scheme, message)
        }
        PrivateKeyInner::Ed25519(sk) => Ok(sk.sign(message).to_bytes().to_vec()),
    }
}

// PSS salt length equals the digest output length, the `rsa` crate default.
fn sign_rsa(
    key: &rsa::RsaPrivateKey,
    scheme: RsaSignatureScheme,
    message: &[u8],
) -> Result<Vec<u8>> {
    use rsa::{pkcs1v15, pss};
    let signature = match scheme {
        RsaSignatureScheme::Pss(RsaDigest::Sha256) => pss::SigningKey::<Sha256>::new(key.clone())
            .try_sign_with_rng(&mut OsRng, message)
            .map_err(ConfigurationError::Signing)?
            .to_vec(),
        RsaSignatureScheme::Pss(RsaDigest::Sha384) => pss::SigningKey::<Sha384>::new(key.clone())
            .try_sign_with_rng(&mut OsRng, message)
            .map_err(ConfigurationError::Signing)?
            .to_vec(),
        RsaSignatureScheme::Pss(RsaDigest::Sha512) => pss::SigningKey::<Sha512>::new(key.clone())
            .try_sign_with_rng(&mut OsRng, message)
            .map_err(ConfigurationError::Signing)?
            .to_vec(),
        RsaSignatureScheme::Pkcs1(RsaDigest::Sha256) => {
            pkcs1v15::SigningKey::<Sha256>::new(key.clone())
                .try_sign(message)
                .map_err(ConfigurationError::Signing)?
                .to_vec()
        }
        RsaSignatureScheme::Pkcs1(RsaDigest::Sha384) => {
            pkcs1v15::SigningKey::<Sha384>::new(key.clone())
                .try_sign(message)
                .map_err(ConfigurationError::Signing)?
                .to_vec()
        }
        RsaSignatureScheme::Pkcs1(RsaDigest::Sha512) => {
            pkcs1v15::SigningKey::<Sha512>::new(key.clone())
                .try_sign(message)
                .map_err(ConfigurationError::Signing)?
                .to_vec()
        }
    };
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{DpopAlgorithm, DpopKeyPair, PublicKeyInner, RsaModulusBits};
    use signature::Verifier;

    fn signed_parts(pair: &DpopKeyPair) -> (String, Vec<u8>) {
        let header = Header::from(pair.jws_algorithm());
        let claims = Claims::default();
        let jwt = create_signed_jwt(pair.private_key(), &header, &claims).unwrap();
        let mut segments = jwt.rsplitn(2, '.');
        let sig = URL_SAFE_NO_PAD.decode(segments.next().unwrap()).unwrap();
        let input = segments.next().unwrap().to_string();
        (input, sig)
    }

    #[test]
    fn es256_signature_verifies() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::default()).unwrap();
        let (input, sig) = signed_parts(&pair);
        let PublicKeyInner::P256(vk) = &pair.public_key().inner else {
            panic!("expected P-256 key");
        };
        let sig = p256::ecdsa::Signature::from_slice(&sig).unwrap();
        vk.verify(input.as_bytes(), &sig).unwrap();
    }

    #[test]
    fn ed25519_signature_verifies() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::Ed25519).unwrap();
        let (input, sig) = signed_parts(&pair);
        let PublicKeyInner::Ed25519(vk) = &pair.public_key().inner else {
            panic!("expected Ed25519 key");
        };
        let sig = ed25519_dalek::Signature::from_slice(&sig).unwrap();
        vk.verify(input.as_bytes(), &sig).unwrap();
    }

    #[test]
    fn ps256_signature_verifies() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::RsaPss(RsaModulusBits::Rsa2048)).unwrap();
        let (input, sig) = signed_parts(&pair);
        let PublicKeyInner::Rsa { key, .. } = &pair.public_key().inner else {
            panic!("expected RSA key");
        };
        let vk = rsa::pss::VerifyingKey::<Sha256>::new(key.clone());
        let sig = rsa::pss::Signature::try_from(sig.as_slice()).unwrap();
        vk.verify(input.as_bytes(), &sig).unwrap();
    }

    #[test]
    fn jwt_has_three_unpadded_segments() {
        let pair = DpopKeyPair::generate(DpopAlgorithm::default()).unwrap();
        let header = Header::from(pair.jws_algorithm());
        let jwt = create_signed_jwt(pair.private_key(), &header, &Claims::default()).unwrap();
        assert_eq!(jwt.split('.').count(), 3);
        assert!(!jwt.contains('='));
    }
}
