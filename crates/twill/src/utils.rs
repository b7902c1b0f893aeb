use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{CryptoRng, RngCore, rngs::ThreadRng};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

pub fn get_random_values<R, const LEN: usize>(rng: &mut R) -> [u8; LEN]
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; LEN];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// Random base64url string from `LEN` bytes of entropy, usable as `state`,
/// a nonce, or a `jti`.
pub fn random_base64url<const LEN: usize>() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, LEN>(&mut ThreadRng::default()))
        .into()
}

/// base64url(SHA-256(value)), the encoding shared by the `ath` claim, PKCE
/// S256 challenges, and JWK thumbprints.
pub fn hash_to_base64url_sha256(value: &str) -> SmolStr {
    URL_SAFE_NO_PAD.encode(Sha256::digest(value.as_bytes())).into()
}
