use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A resource scope selector: one or more tenant/workspace ids a caller
/// is authorized against. `resourceId` accepts either a single string
/// or an array on the wire; normalized to a set internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScope {
    #[serde(rename = "resourceId")]
    pub resource_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

impl ResourceScope {
    pub fn new(resource_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            resource_ids: resource_ids.into_iter().map(Into::into).collect(),
            properties: None,
        }
    }

    pub fn single(resource_id: impl Into<String>) -> Self {
        Self::new([resource_id.into()])
    }

    pub fn as_set(&self) -> BTreeSet<&str> {
        self.resource_ids.iter().map(String::as_str).collect()
    }
}

/// The client-declared resource-id hint parsed from the
/// `X-CopilotKit-Resource-ID` header. Absent, single, or multi-valued;
/// the `ScopeResolver` decides how (or whether) to honor it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientHint {
    Absent,
    Single(String),
    Multiple(Vec<String>),
}

impl ClientHint {
    /// Flatten to the list of ids the client declared, empty if absent.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ClientHint::Absent => Vec::new(),
            ClientHint::Single(v) => vec![v.as_str()],
            ClientHint::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// Parses the raw header value per spec: absent -> `Absent`; a single
/// value -> `Single` (URI-decoded); comma-separated -> `Multiple`
/// (trimmed per item, preserving empty items and duplicates).
pub fn parse_client_hint(header_value: Option<&str>) -> ClientHint {
    let Some(raw) = header_value else {
        return ClientHint::Absent;
    };
    if !raw.contains(',') {
        return ClientHint::Single(uri_decode(raw));
    }
    ClientHint::Multiple(raw.split(',').map(|part| uri_decode(part.trim())).collect())
}

/// Minimal percent-decoding for the common `%XX` + `+`-as-space cases
/// this header is expected to carry; malformed escapes pass through
/// unchanged rather than erroring, matching the "never reject on
/// malformed client input at parse time" posture the resolver owns.
fn uri_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_parses_to_absent() {
        assert_eq!(parse_client_hint(None), ClientHint::Absent);
    }

    #[test]
    fn single_value_parses_to_single() {
        assert_eq!(
            parse_client_hint(Some("alice")),
            ClientHint::Single("alice".into())
        );
    }

    #[test]
    fn empty_header_parses_to_single_empty_string() {
        assert_eq!(parse_client_hint(Some("")), ClientHint::Single("".into()));
    }

    #[test]
    fn comma_separated_parses_to_multiple_trimmed() {
        assert_eq!(
            parse_client_hint(Some("alice, bob,,bob")),
            ClientHint::Multiple(vec![
                "alice".into(),
                "bob".into(),
                "".into(),
                "bob".into()
            ])
        );
    }

    #[test]
    fn percent_encoding_is_decoded() {
        assert_eq!(
            parse_client_hint(Some("team%20alpha")),
            ClientHint::Single("team alpha".into())
        );
    }
}
