// Cookie normalization - converts caller cookie payloads to Netscape cookies.txt
//
// Accepted forms:
// - Netscape cookies.txt (passed through)
// - `data:text/plain;base64,...` URLs and bare base64 blobs
// - JSON arrays exported by browser extensions
// - `name=value; name2=value2` header strings

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

pub const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

const DEFAULT_DOMAIN: &str = ".youtube.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieFormatError {
    #[error("Cookie payload is empty")]
    Empty,

    #[error("Invalid base64 cookie blob: {0}")]
    Base64(String),

    #[error("Invalid JSON cookie export: {0}")]
    Json(String),

    #[error("Unrecognized cookie format")]
    Unrecognized,
}

/// Browser extension export entry (EditThisCookie / Cookie-Editor shape)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonCookie {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    expiration_date: Option<f64>,
    name: String,
    #[serde(default)]
    value: String,
}

/// Convert a caller-supplied cookie payload to canonical Netscape text.
pub fn normalize(raw: &str) -> Result<String, CookieFormatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CookieFormatError::Empty);
    }

    if is_netscape(trimmed) {
        return Ok(trimmed.to_string());
    }

    if let Some(rest) = trimmed.strip_prefix("data:") {
        let (_, encoded) = rest.split_once(',').ok_or(CookieFormatError::Unrecognized)?;
        let decoded = decode_base64(encoded)?;
        return normalize_decoded(&decoded);
    }

    if trimmed.starts_with('[') {
        return json_to_netscape(trimmed);
    }

    if trimmed.contains('=') && !trimmed.contains('\n') && !looks_like_base64(trimmed) {
        return Ok(header_to_netscape(trimmed));
    }

    if looks_like_base64(trimmed) {
        return match decode_base64(trimmed) {
            Ok(decoded) => normalize_decoded(&decoded),
            // single `name=value` pair made only of base64 characters
            Err(_) if trimmed.contains('=') => Ok(header_to_netscape(trimmed)),
            Err(e) => Err(e),
        };
    }

    Err(CookieFormatError::Unrecognized)
}

// A decoded blob may itself be any of the textual forms, but never another blob.
fn normalize_decoded(decoded: &str) -> Result<String, CookieFormatError> {
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        return Err(CookieFormatError::Empty);
    }
    if is_netscape(trimmed) {
        Ok(trimmed.to_string())
    } else if trimmed.starts_with('[') {
        json_to_netscape(trimmed)
    } else if trimmed.contains('=') {
        Ok(header_to_netscape(trimmed))
    } else {
        Err(CookieFormatError::Unrecognized)
    }
}

fn is_netscape(text: &str) -> bool {
    text.starts_with(NETSCAPE_HEADER)
        || text.starts_with("# HTTP Cookie File")
        || text
            .lines()
            .any(|l| !l.starts_with('#') && l.split('\t').count() >= 7)
}

fn looks_like_base64(text: &str) -> bool {
    text.len() >= 16
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
}

fn decode_base64(encoded: &str) -> Result<String, CookieFormatError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CookieFormatError::Base64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CookieFormatError::Base64(e.to_string()))
}

fn json_to_netscape(text: &str) -> Result<String, CookieFormatError> {
    let cookies: Vec<JsonCookie> =
        serde_json::from_str(text).map_err(|e| CookieFormatError::Json(e.to_string()))?;

    let mut lines = vec![NETSCAPE_HEADER.to_string()];
    for cookie in cookies {
        let domain = cookie.domain.unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
        let include_subdomains = if domain.starts_with('.') { "TRUE" } else { "FALSE" };
        let secure = if cookie.secure { "TRUE" } else { "FALSE" };
        let expiry = cookie.expiration_date.map(|e| e as i64).unwrap_or(0);
        lines.push(format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            domain,
            include_subdomains,
            cookie.path.as_deref().unwrap_or("/"),
            secure,
            expiry,
            cookie.name,
            cookie.value
        ));
    }
    Ok(lines.join("\n"))
}

fn header_to_netscape(text: &str) -> String {
    let mut lines = vec![NETSCAPE_HEADER.to_string()];
    for pair in text.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            lines.push(format!(
                "{}\tTRUE\t/\tFALSE\t0\t{}\t{}",
                DEFAULT_DOMAIN,
                name,
                value.trim()
            ));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_FORM: &str = "SID=a; HSID=b; SSID=c; APISID=d; SAPISID=e/f=";

    #[test]
    fn test_netscape_passthrough() {
        let jar = "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tx";
        assert_eq!(normalize(jar).unwrap(), jar);
    }

    #[test]
    fn test_header_form() {
        let out = normalize(HEADER_FORM).unwrap();
        assert!(out.starts_with(NETSCAPE_HEADER));
        assert!(out.contains(".youtube.com\tTRUE\t/\tFALSE\t0\tSAPISID\te/f="));
        assert_eq!(out.lines().count(), 6);
    }

    #[test]
    fn test_json_export() {
        let json = r#"[
            {"domain": ".youtube.com", "path": "/", "secure": true,
             "expirationDate": 1893456000.5, "name": "SID", "value": "x"},
            {"domain": "www.youtube.com", "name": "PREF", "value": "f6=8"}
        ]"#;
        let out = normalize(json).unwrap();
        assert!(out.contains(".youtube.com\tTRUE\t/\tTRUE\t1893456000\tSID\tx"));
        assert!(out.contains("www.youtube.com\tFALSE\t/\tFALSE\t0\tPREF\tf6=8"));
    }

    #[test]
    fn test_data_url_and_bare_base64() {
        let encoded = STANDARD.encode(HEADER_FORM);
        let from_data = normalize(&format!("data:text/plain;base64,{}", encoded)).unwrap();
        let from_bare = normalize(&encoded).unwrap();
        assert_eq!(from_data, from_bare);
        assert!(from_bare.contains("\tAPISID\td"));
    }

    #[test]
    fn test_errors() {
        assert_eq!(normalize("  "), Err(CookieFormatError::Empty));
        assert_eq!(normalize("hello"), Err(CookieFormatError::Unrecognized));
        assert!(matches!(normalize("[{\"value\": 1}]"), Err(CookieFormatError::Json(_))));
        assert!(matches!(
            normalize("data:text/plain;base64,@@@"),
            Err(CookieFormatError::Base64(_))
        ));
    }
}
