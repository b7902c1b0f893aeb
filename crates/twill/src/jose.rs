//! JOSE structures and compact JWS signing for DPoP proofs.

pub mod jwk;
pub mod jws;
pub mod jwt;
pub mod signing;

pub use self::signing::create_signed_jwt;
