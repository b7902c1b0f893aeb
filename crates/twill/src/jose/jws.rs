use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::jwk::Jwk;
use crate::key::JwsAlgorithm;

/// JOSE header for a compact JWS.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub alg: JwsAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<SmolStr>,
}

impl From<JwsAlgorithm> for Header {
    fn from(alg: JwsAlgorithm) -> Self {
        Self {
            alg,
            typ: None,
            jwk: None,
            kid: None,
        }
    }
}
