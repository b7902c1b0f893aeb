use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use http::{Method, Response};
use rand::{RngCore, SeedableRng};
use smol_str::SmolStr;
use url::Url;

use crate::{
    error::Result,
    jose::{
        create_signed_jwt,
        jws::Header,
        jwt::{Claims, ProofClaims, RegisteredClaims},
    },
    key::{DpopKeyPair, DpopPublicKey},
    utils::hash_to_base64url_sha256,
};

pub const JWT_HEADER_TYP_DPOP: &str = "dpop+jwt";

/// Inputs for one DPoP proof. A proof binds a single HTTP request, so the
/// caller builds fresh params per attempt.
#[derive(Debug)]
pub struct ProofParams<'p> {
    pub url: &'p Url,
    pub method: &'p Method,
    pub key_pair: &'p DpopKeyPair,
    /// Server-issued nonce from a prior `DPoP-Nonce` header, if any.
    pub nonce: Option<SmolStr>,
    /// Access token whose hash becomes the `ath` claim.
    pub access_token: Option<&'p str>,
}

/// Build a compact `dpop+jwt` proof with embedded public JWK
/// (RFC 9449 §4.2).
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(method = %params.method, url = %params.url))
)]
pub fn generate_proof(params: ProofParams<'_>) -> Result<String> {
    let mut header = Header::from(params.key_pair.jws_algorithm());
    header.typ = Some(JWT_HEADER_TYP_DPOP.into());
    header.jwk = Some(params.key_pair.public_key().to_jwk());

    // htu excludes query and fragment.
    let htu = format!(
        "{}{}",
        params.url.origin().ascii_serialization(),
        params.url.path()
    );
    let claims = Claims {
        registered: RegisteredClaims {
            jti: Some(generate_jti()),
            iat: Some(Utc::now().timestamp()),
            ..Default::default()
        },
        proof: ProofClaims {
            htm: Some(params.method.as_str().into()),
            htu: Some(htu.into()),
            ath: params.access_token.map(hash_to_base64url_sha256),
            nonce: params.nonce,
        },
    };
    create_signed_jwt(params.key_pair.private_key(), &header, &claims)
}

/// RFC 7638 thumbprint of the proof key, as servers expect in `jkt`
/// token confirmation claims.
pub fn calculate_jwk_thumbprint(key: &DpopPublicKey) -> Result<SmolStr> {
    key.thumbprint()
}

#[inline]
pub(crate) fn generate_jti() -> SmolStr {
    let mut rng = rand::rngs::SmallRng::from_entropy();
    let mut bytes = [0u8; 12];
    rng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes).into()
}

/// A resource server asking for a (new) nonce answers with
/// `WWW-Authenticate: DPoP ..., error="use_dpop_nonce"` (RFC 9449 §8).
#[inline]
pub(crate) fn is_use_dpop_nonce_error(response: &Response<Vec<u8>>) -> bool {
    if response.status().is_success() {
        return false;
    }
    if let Some(www_auth) = response
        .headers()
        .get(http::header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
    {
        return www_auth.starts_with("DPoP") && www_auth.contains(r#"error="use_dpop_nonce""#);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::DpopAlgorithm;
    use serde_json::Value;

    fn decode_segment(segment: &str) -> Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    #[test]
    fn proof_carries_htm_htu_and_embedded_jwk() {
        let key_pair = DpopKeyPair::generate(DpopAlgorithm::default()).unwrap();
        let url = Url::parse("https://api.example.com/resource?page=2#top").unwrap();
        let proof = generate_proof(ProofParams {
            url: &url,
            method: &Method::POST,
            key_pair: &key_pair,
            nonce: None,
            access_token: None,
        })
        .unwrap();

        let segments: Vec<&str> = proof.split('.').collect();
        assert_eq!(segments.len(), 3);

        let header = decode_segment(segments[0]);
        assert_eq!(header["typ"], "dpop+jwt");
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["jwk"]["kty"], "EC");
        assert!(header["jwk"].get("d").is_none());

        let payload = decode_segment(segments[1]);
        assert_eq!(payload["htm"], "POST");
        // Query and fragment are stripped.
        assert_eq!(payload["htu"], "https://api.example.com/resource");
        assert!(payload["jti"].is_string());
        assert!(payload["iat"].is_i64());
        assert!(payload.get("nonce").is_none());
        assert!(payload.get("ath").is_none());
    }

    #[test]
    fn proof_includes_nonce_and_ath_when_present() {
        let key_pair = DpopKeyPair::generate(DpopAlgorithm::default()).unwrap();
        let url = Url::parse("https://api.example.com/resource").unwrap();
        let proof = generate_proof(ProofParams {
            url: &url,
            method: &Method::GET,
            key_pair: &key_pair,
            nonce: Some("server-nonce".into()),
            access_token: Some("token-123"),
        })
        .unwrap();

        let payload = decode_segment(proof.split('.').nth(1).unwrap());
        assert_eq!(payload["nonce"], "server-nonce");
        assert_eq!(
            payload["ath"],
            hash_to_base64url_sha256("token-123").as_str()
        );
    }

    #[test]
    fn es512_proofs_carry_p521_jwk() {
        let key_pair =
            DpopKeyPair::generate(DpopAlgorithm::Ecdsa(crate::key::EcdsaCurve::P521)).unwrap();
        let url = Url::parse("https://api.example.com/resource").unwrap();
        let proof = generate_proof(ProofParams {
            url: &url,
            method: &Method::GET,
            key_pair: &key_pair,
            nonce: None,
            access_token: None,
        })
        .unwrap();

        let header = decode_segment(proof.split('.').next().unwrap());
        assert_eq!(header["alg"], "ES512");
        assert_eq!(header["jwk"]["crv"], "P-521");
        assert_eq!(
            format!("{:?}", key_pair.public_key()),
            "DpopPublicKey(ES512)"
        );
    }

    #[test]
    fn jti_is_unique_per_proof() {
        assert_ne!(generate_jti(), generate_jti());
    }

    #[test]
    fn nonce_challenge_detection() {
        let challenge = Response::builder()
            .status(401)
            .header(
                "WWW-Authenticate",
                r#"DPoP algs="ES256", error="use_dpop_nonce", error_description="Resource server requires nonce in DPoP proof""#,
            )
            .body(Vec::new())
            .unwrap();
        assert!(is_use_dpop_nonce_error(&challenge));

        let bearer = Response::builder()
            .status(401)
            .header("WWW-Authenticate", r#"Bearer error="invalid_token""#)
            .body(Vec::new())
            .unwrap();
        assert!(!is_use_dpop_nonce_error(&bearer));

        let ok = Response::builder().status(200).body(Vec::new()).unwrap();
        assert!(!is_use_dpop_nonce_error(&ok));

        let plain_401 = Response::builder().status(401).body(Vec::new()).unwrap();
        assert!(!is_use_dpop_nonce_error(&plain_401));
    }
}
