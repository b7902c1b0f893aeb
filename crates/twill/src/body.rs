//! Request body encoding and response body parsing, keyed by MIME type.

use http::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::{ConfigurationError, OAuthError, Result};
use crate::utils::random_base64url;

/// Content types the codec understands, both for encoding requests and for
/// interpreting responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    Json,
    Text,
    FormData,
    FormUrlEncoded,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Text => "text/plain",
            ContentType::FormData => "multipart/form-data",
            ContentType::FormUrlEncoded => "application/x-www-form-urlencoded",
        }
    }
}

/// A request payload before encoding. `From` impls cover the common cases
/// so call sites can pass a `serde_json::Value`, a string, or field pairs
/// directly.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
    Fields(Vec<(String, String)>),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.into())
    }
}

impl From<Vec<(String, String)>> for RequestBody {
    fn from(fields: Vec<(String, String)>) -> Self {
        RequestBody::Fields(fields)
    }
}

/// Wire-ready body plus the `Content-Type` header value to send with it.
/// The header can differ from the configured MIME type: multipart carries
/// a generated boundary parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    pub content_type: SmolStr,
}

/// Encode a request body for the given content type. Combinations with no
/// sensible encoding fail `Configuration` before any network I/O.
pub fn format_request_body(body: &RequestBody, content_type: ContentType) -> Result<EncodedBody> {
    let unsupported = || {
        OAuthError::from(ConfigurationError::UnsupportedBody {
            content_type: content_type.mime().into(),
        })
    };
    match content_type {
        ContentType::Json => {
            let bytes = match body {
                RequestBody::Json(value) => {
                    serde_json::to_vec(value).map_err(ConfigurationError::from)?
                }
                RequestBody::Fields(fields) => {
                    let map: serde_json::Map<String, Value> = fields
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect();
                    serde_json::to_vec(&map).map_err(ConfigurationError::from)?
                }
                RequestBody::Text(_) => return Err(unsupported()),
            };
            Ok(EncodedBody {
                bytes,
                content_type: content_type.mime().into(),
            })
        }
        ContentType::Text => {
            let bytes = match body {
                RequestBody::Text(text) => text.clone().into_bytes(),
                RequestBody::Json(_) | RequestBody::Fields(_) => return Err(unsupported()),
            };
            Ok(EncodedBody {
                bytes,
                content_type: content_type.mime().into(),
            })
        }
        ContentType::FormData => {
            let RequestBody::Fields(fields) = body else {
                return Err(unsupported());
            };
            let boundary = random_base64url::<16>();
            Ok(EncodedBody {
                bytes: encode_multipart(fields, &boundary),
                content_type: smol_str::format_smolstr!("multipart/form-data; boundary={boundary}"),
            })
        }
        ContentType::FormUrlEncoded => {
            let RequestBody::Fields(fields) = body else {
                return Err(unsupported());
            };
            let encoded =
                serde_html_form::to_string(fields).map_err(ConfigurationError::from)?;
            Ok(EncodedBody {
                bytes: encoded.into_bytes(),
                content_type: content_type.mime().into(),
            })
        }
    }
}

fn encode_multipart(fields: &[(String, String)], boundary: &str) -> Vec<u8> {
    let mut out = String::new();
    for (name, value) in fields {
        out.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    out.push_str(&format!("--{boundary}--\r\n"));
    out.into_bytes()
}

/// A parsed response payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Fields(Vec<(String, String)>),
    /// No body (204, or an empty response without a Content-Type).
    Empty,
}

impl ResponseBody {
    /// Deserialize a JSON body into a typed value.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            ResponseBody::Json(value) => {
                serde_json::from_value(value).map_err(|e| OAuthError::ResponseParse {
                    source: e.into(),
                    raw: None,
                })
            }
            other => Err(OAuthError::ResponseParse {
                source: format!("expected a JSON body, got {other:?}").into(),
                raw: None,
            }),
        }
    }
}

/// Interpret a response body per its declared `Content-Type`. Unknown or
/// missing types degrade to text so callers still see the payload.
pub fn parse_response_body(response: &Response<Vec<u8>>) -> Result<ResponseBody> {
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let Some(content_type) = content_type else {
        if response.status() == http::StatusCode::NO_CONTENT || response.body().is_empty() {
            return Ok(ResponseBody::Empty);
        }
        #[cfg(feature = "tracing")]
        tracing::warn!("response has a body but no Content-Type header, returning it as text");
        return Ok(ResponseBody::Text(lossy_text(response.body())));
    };

    // Lowercase only for MIME matching; the multipart boundary parameter
    // is case-sensitive and must be read from the original header.
    let mime = content_type.to_ascii_lowercase();
    if mime.contains("application/json") || mime.contains("+json") {
        let value = serde_json::from_slice(response.body()).map_err(|e| {
            OAuthError::ResponseParse {
                source: e.into(),
                raw: String::from_utf8(response.body().clone()).ok(),
            }
        })?;
        Ok(ResponseBody::Json(value))
    } else if mime.contains("multipart/form-data") {
        parse_multipart(content_type, response.body())
    } else if mime.contains("application/x-www-form-urlencoded")
        || mime.contains("text/")
    {
        Ok(ResponseBody::Text(lossy_text(response.body())))
    } else {
        #[cfg(feature = "tracing")]
        tracing::warn!(%content_type, "unrecognized response Content-Type, returning it as text");
        Ok(ResponseBody::Text(lossy_text(response.body())))
    }
}

fn lossy_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// Minimal parser for the field-only multipart bodies this client produces
// and consumes: no file parts, no nested content types.
fn parse_multipart(content_type: &str, body: &[u8]) -> Result<ResponseBody> {
    let parse_err = |msg: &str| OAuthError::ResponseParse {
        source: msg.to_string().into(),
        raw: String::from_utf8(body.to_vec()).ok(),
    };
    let boundary = content_type
        .split(';')
        .filter_map(|p| p.trim().strip_prefix("boundary="))
        .next()
        .map(|b| b.trim_matches('"'))
        .ok_or_else(|| parse_err("multipart response without a boundary parameter"))?;

    let text = std::str::from_utf8(body)
        .map_err(|_| parse_err("multipart response is not valid UTF-8"))?;
    let delimiter = format!("--{boundary}");

    let mut fields = Vec::new();
    for part in text.split(&delimiter) {
        let part = part.trim_start_matches("\r\n");
        if part.is_empty() || part.starts_with("--") {
            continue;
        }
        let (raw_headers, value) = part
            .split_once("\r\n\r\n")
            .ok_or_else(|| parse_err("multipart part without a header/body separator"))?;
        let name = raw_headers
            .lines()
            .filter(|l| l.to_ascii_lowercase().starts_with("content-disposition"))
            .filter_map(|l| l.split("name=\"").nth(1))
            .filter_map(|rest| rest.split('"').next())
            .next()
            .ok_or_else(|| parse_err("multipart part without a field name"))?;
        fields.push((
            name.to_string(),
            value.trim_end_matches("\r\n").to_string(),
        ));
    }
    Ok(ResponseBody::Fields(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_is_serialized() {
        let encoded =
            format_request_body(&json!({"a": 1}).into(), ContentType::Json).unwrap();
        assert_eq!(encoded.content_type, "application/json");
        assert_eq!(encoded.bytes, br#"{"a":1}"#);
    }

    #[test]
    fn fields_encode_as_json_object() {
        let body: RequestBody = vec![("a".to_string(), "1".to_string())].into();
        let encoded = format_request_body(&body, ContentType::Json).unwrap();
        assert_eq!(encoded.bytes, br#"{"a":"1"}"#);
    }

    #[test]
    fn fields_url_encode_in_order() {
        let body: RequestBody = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "two words".to_string()),
        ]
        .into();
        let encoded = format_request_body(&body, ContentType::FormUrlEncoded).unwrap();
        assert_eq!(encoded.content_type, "application/x-www-form-urlencoded");
        assert_eq!(encoded.bytes, b"a=1&b=two+words");
    }

    #[test]
    fn multipart_encoding_round_trips_through_the_parser() {
        let body: RequestBody = vec![
            ("name".to_string(), "twill".to_string()),
            ("kind".to_string(), "fabric".to_string()),
        ]
        .into();
        let encoded = format_request_body(&body, ContentType::FormData).unwrap();
        assert!(encoded.content_type.starts_with("multipart/form-data; boundary="));

        let response = Response::builder()
            .status(200)
            .header("Content-Type", encoded.content_type.as_str())
            .body(encoded.bytes)
            .unwrap();
        let parsed = parse_response_body(&response).unwrap();
        assert_eq!(
            parsed,
            ResponseBody::Fields(vec![
                ("name".to_string(), "twill".to_string()),
                ("kind".to_string(), "fabric".to_string()),
            ])
        );
    }

    #[test]
    fn multipart_boundary_keeps_its_case() {
        // base64url boundaries are case-sensitive; lowercasing the header
        // for MIME matching must not leak into delimiter matching.
        let body = b"--AbC123xYz\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\nvalue\r\n--AbC123xYz--\r\n";
        let response = Response::builder()
            .status(200)
            .header("Content-Type", "Multipart/Form-Data; boundary=AbC123xYz")
            .body(body.to_vec())
            .unwrap();
        assert_eq!(
            parse_response_body(&response).unwrap(),
            ResponseBody::Fields(vec![("key".to_string(), "value".to_string())])
        );
    }

    #[test]
    fn mismatched_body_and_content_type_is_a_configuration_error() {
        let err = format_request_body(&"plain".into(), ContentType::Json).unwrap_err();
        assert!(matches!(
            err,
            OAuthError::Configuration(ConfigurationError::UnsupportedBody { .. })
        ));
        let err =
            format_request_body(&json!({"a": 1}).into(), ContentType::FormData).unwrap_err();
        assert!(matches!(
            err,
            OAuthError::Configuration(ConfigurationError::UnsupportedBody { .. })
        ));
    }

    #[test]
    fn response_parsing_follows_declared_content_type() {
        let response = Response::builder()
            .status(200)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(br#"{"ok":true}"#.to_vec())
            .unwrap();
        assert_eq!(
            parse_response_body(&response).unwrap(),
            ResponseBody::Json(json!({"ok": true}))
        );

        let response = Response::builder()
            .status(200)
            .header("Content-Type", "text/plain")
            .body(b"hello".to_vec())
            .unwrap();
        assert_eq!(
            parse_response_body(&response).unwrap(),
            ResponseBody::Text("hello".to_string())
        );
    }

    #[test]
    fn invalid_json_on_success_is_a_parse_error_with_raw_body() {
        let response = Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(b"not json".to_vec())
            .unwrap();
        let err = parse_response_body(&response).unwrap_err();
        assert!(matches!(
            err,
            OAuthError::ResponseParse { raw: Some(raw), .. } if raw == "not json"
        ));
    }

    #[test]
    fn missing_content_type_handling() {
        let no_content = Response::builder().status(204).body(Vec::new()).unwrap();
        assert_eq!(parse_response_body(&no_content).unwrap(), ResponseBody::Empty);

        let with_body = Response::builder()
            .status(200)
            .body(b"anonymous".to_vec())
            .unwrap();
        assert_eq!(
            parse_response_body(&with_body).unwrap(),
            ResponseBody::Text("anonymous".to_string())
        );
    }

    #[test]
    fn unknown_content_type_degrades_to_text() {
        let response = Response::builder()
            .status(200)
            .header("Content-Type", "application/octet-stream")
            .body(b"bytes".to_vec())
            .unwrap();
        assert_eq!(
            parse_response_body(&response).unwrap(),
            ResponseBody::Text("bytes".to_string())
        );
    }

    #[test]
    fn into_json_deserializes_typed_values() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Widget {
            id: u32,
        }
        let body = ResponseBody::Json(json!({"id": 7}));
        assert_eq!(body.into_json::<Widget>().unwrap(), Widget { id: 7 });

        let err = ResponseBody::Text("nope".into()).into_json::<Widget>().unwrap_err();
        assert!(matches!(err, OAuthError::ResponseParse { .. }));
    }
}
