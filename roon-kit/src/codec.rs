// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! The MOO/1 wire codec: a text header followed by an optional JSON body,
//! carried inside WebSocket frames.
//!
//! ```text
//! MOO/1 <VERB> <NAME>\n
//! Request-Id: <int>\n
//! [Content-Type: application/json\n]
//! [Content-Length: <n>\n]
//! \n
//! [<n> bytes of JSON]
//! ```

use crate::error::CodecError;
use serde_json::Value;

const PROTOCOL_VERSION: &str = "1";

/// The verb carried by a `REQUEST`/`COMPLETE`/`CONTINUE` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// A request originating from either peer.
    Request,
    /// A terminal response to a request.
    Complete,
    /// A non-terminal (subscription) response to a request.
    Continue,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Request => "REQUEST",
            Verb::Complete => "COMPLETE",
            Verb::Continue => "CONTINUE",
        }
    }

    fn parse(s: &str) -> Result<Self, CodecError> {
        match s {
            "REQUEST" => Ok(Verb::Request),
            "COMPLETE" => Ok(Verb::Complete),
            "CONTINUE" => Ok(Verb::Continue),
            other => Err(CodecError::InvalidFormat(format!("unknown verb `{other}`"))),
        }
    }
}

/// A decoded MOO/1 frame.
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    /// A `REQUEST` frame: `<service>/<method>` with an optional JSON body.
    Request {
        /// The id the sender used to correlate a response.
        id: i64,
        /// The service path, e.g. `com.roonlabs.transport:2`.
        service: String,
        /// The method name, e.g. `subscribe_zones`.
        method: String,
        /// The parsed JSON body, if one was present.
        body: Option<Value>,
    },
    /// A `COMPLETE` or `CONTINUE` frame.
    Response {
        /// Which of the two response verbs this is.
        verb: Verb,
        /// The id of the request this responds to.
        id: i64,
        /// The status/name token, e.g. `Success`, `Registered`, `Changed`, or an error name.
        name: String,
        /// The declared `Content-Type` header, if any.
        content_type: Option<String>,
        /// The parsed JSON body, when `content_type` was `application/json`.
        body: Option<Value>,
        /// The raw body bytes, always present when a body was sent.
        raw_body: Option<Vec<u8>>,
    },
}

/// Names that indicate a successful response per spec.md §3.
pub fn is_success_name(name: &str) -> bool {
    matches!(name, "Success" | "Registered" | "Subscribed" | "Changed")
}

/// Encode a `REQUEST` frame.
pub fn encode_request(id: i64, path: &str, body: Option<&Value>) -> Vec<u8> {
    encode_frame(Verb::Request, id, path, body)
}

/// Encode a `COMPLETE` response frame (the only response verb this client emits, for
/// the inbound ping/keepalive service).
pub fn encode_response(id: i64, name: &str, body: Option<&Value>) -> Vec<u8> {
    encode_frame(Verb::Complete, id, name, body)
}

fn encode_frame(verb: Verb, id: i64, name: &str, body: Option<&Value>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("MOO/1 {} {}\n", verb.as_str(), name).as_bytes());
    out.extend_from_slice(format!("Request-Id: {id}\n").as_bytes());

    if let Some(body) = body {
        // `serde_json::Value` always serializes without error.
        let json = serde_json::to_vec(body).expect("Value always serializes");
        out.extend_from_slice(b"Content-Type: application/json\n");
        out.extend_from_slice(format!("Content-Length: {}\n", json.len()).as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&json);
    } else {
        out.push(b'\n');
    }

    out
}

/// Decode a single MOO/1 frame from raw bytes.
pub fn decode(bytes: &[u8]) -> Result<DecodedFrame, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::InvalidFormat("empty frame".into()));
    }

    let text = String::from_utf8_lossy(bytes);

    // Split header from body on the first blank line, tolerating repeats.
    let mut header_end = None;
    let mut search_from = 0;
    while let Some(idx) = text[search_from..].find('\n') {
        let line_start = search_from;
        let line = &text[line_start..search_from + idx];
        if line.trim_end_matches('\r').is_empty() {
            header_end = Some(search_from + idx + 1);
            break;
        }
        search_from += idx + 1;
    }
    let header_end = header_end.unwrap_or(text.len());
    let header_text = &text[..header_end];

    let mut lines = header_text.lines();
    let first_line = lines
        .next()
        .ok_or_else(|| CodecError::InvalidFormat("missing header line".into()))?;

    let mut parts = first_line.splitn(3, ' ');
    let moo_token = parts
        .next()
        .ok_or_else(|| CodecError::InvalidFormat("missing MOO/1 token".into()))?;
    let verb_token = parts
        .next()
        .ok_or_else(|| CodecError::InvalidFormat("malformed first line".into()))?;
    let name = parts
        .next()
        .ok_or_else(|| CodecError::InvalidFormat("malformed first line".into()))?
        .trim();

    let version = moo_token
        .strip_prefix("MOO/")
        .ok_or_else(|| CodecError::InvalidFormat("missing MOO/1 token".into()))?;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::InvalidFormat(format!(
            "unsupported protocol version `{version}`"
        )));
    }

    let verb = Verb::parse(verb_token)?;

    let mut request_id: Option<i64> = None;
    let mut content_type: Option<String> = None;
    let mut content_length: Option<usize> = None;

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "Request-Id" => {
                request_id = Some(value.parse::<i64>().map_err(|_| {
                    CodecError::InvalidFormat(format!("invalid Request-Id `{value}`"))
                })?);
            }
            "Content-Type" => content_type = Some(value.to_string()),
            "Content-Length" => {
                content_length = Some(value.parse::<usize>().map_err(|_| {
                    CodecError::InvalidFormat(format!("invalid Content-Length `{value}`"))
                })?);
            }
            _ => {}
        }
    }

    let id = request_id.ok_or_else(|| CodecError::InvalidFormat("missing Request-Id".into()))?;

    let body_bytes: &[u8] = if let Some(len) = content_length {
        let body_start = header_end;
        let all_body = &bytes[body_start.min(bytes.len())..];
        if all_body.len() < len {
            &all_body[..]
        } else {
            &all_body[..len]
        }
    } else {
        &[]
    };

    let raw_body = if body_bytes.is_empty() {
        None
    } else {
        Some(body_bytes.to_vec())
    };

    let body = match (&content_type, &raw_body) {
        (Some(ct), Some(raw)) if ct.contains("application/json") => {
            Some(serde_json::from_slice(raw)?)
        }
        _ => None,
    };

    match verb {
        Verb::Request => {
            let (service, method) = name.rsplit_once('/').ok_or_else(|| {
                CodecError::InvalidFormat(format!("malformed service path `{name}`"))
            })?;
            Ok(DecodedFrame::Request {
                id,
                service: service.to_string(),
                method: method.to_string(),
                body,
            })
        }
        Verb::Complete | Verb::Continue => Ok(DecodedFrame::Response {
            verb,
            id,
            name: name.to_string(),
            content_type,
            body,
            raw_body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_request_with_body() {
        let body = json!({"zone_or_output_id": "z1", "control": "play"});
        let bytes = encode_request(7, "com.roonlabs.transport:2/control", Some(&body));
        let decoded = decode(&bytes).unwrap();

        match decoded {
            DecodedFrame::Request {
                id,
                service,
                method,
                body: decoded_body,
            } => {
                assert_eq!(id, 7);
                assert_eq!(service, "com.roonlabs.transport:2");
                assert_eq!(method, "control");
                assert_eq!(decoded_body, Some(body));
            }
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn round_trips_response_with_body() {
        let body = json!({"core_id": "c1"});
        let bytes = encode_response(3, "Success", Some(&body));
        let decoded = decode(&bytes).unwrap();

        match decoded {
            DecodedFrame::Response {
                verb, id, name, body: decoded_body, ..
            } => {
                assert_eq!(verb, Verb::Complete);
                assert_eq!(id, 3);
                assert_eq!(name, "Success");
                assert_eq!(decoded_body, Some(body));
            }
            _ => panic!("expected a response"),
        }
    }

    #[test]
    fn round_trips_response_without_body() {
        let bytes = encode_response(3, "Success", None);
        let decoded = decode(&bytes).unwrap();
        match decoded {
            DecodedFrame::Response { body, raw_body, .. } => {
                assert!(body.is_none());
                assert!(raw_body.is_none());
            }
            _ => panic!("expected a response"),
        }
    }

    #[test]
    fn tolerates_whitespace_and_skips_headers_without_colons() {
        let raw = b"MOO/1 COMPLETE Success\nRequest-Id:   42  \nnot-a-header-line\n\n";
        let decoded = decode(raw).unwrap();
        match decoded {
            DecodedFrame::Response { id, name, .. } => {
                assert_eq!(id, 42);
                assert_eq!(name, "Success");
            }
            _ => panic!("expected a response"),
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(decode(b""), Err(CodecError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_missing_request_id() {
        let raw = b"MOO/1 COMPLETE Success\n\n";
        assert!(matches!(decode(raw), Err(CodecError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_unsupported_version() {
        let raw = b"MOO/2 COMPLETE Success\nRequest-Id: 1\n\n";
        assert!(matches!(decode(raw), Err(CodecError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_unknown_verb() {
        let raw = b"MOO/1 FROBNICATE Success\nRequest-Id: 1\n\n";
        assert!(matches!(decode(raw), Err(CodecError::InvalidFormat(_))));
    }

    #[test]
    fn negative_request_ids_are_allowed() {
        let raw = b"MOO/1 COMPLETE Success\nRequest-Id: -1\n\n";
        let decoded = decode(raw).unwrap();
        assert!(matches!(decoded, DecodedFrame::Response { id: -1, .. }));
    }

    #[test]
    fn success_name_classification() {
        assert!(is_success_name("Success"));
        assert!(is_success_name("Registered"));
        assert!(is_success_name("Subscribed"));
        assert!(is_success_name("Changed"));
        assert!(!is_success_name("InvalidRequest"));
    }
}
