use crate::AcsError;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt::{self, Debug, Formatter};
use url::{Position, Url};

/// A Communication Services connection string, `endpoint=<url>;accesskey=<base64 key>`.
#[derive(Clone)]
pub struct ConnectionString {
    pub endpoint: Url,
    access_key: Vec<u8>,
}

impl Debug for ConnectionString {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ConnectionString {
    pub fn parse(value: &str) -> Result<ConnectionString, AcsError> {
        let mut endpoint = None;
        let mut access_key = None;

        for segment in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, val) = segment.split_once('=').ok_or_else(|| {
                AcsError::ConnectionString(format!("malformed segment `{segment}`"))
            })?;
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(val.trim()),
                "accesskey" => access_key = Some(val.trim()),
                _ => {}
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| AcsError::ConnectionString("missing `endpoint`".to_string()))?;
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AcsError::ConnectionString(format!("invalid endpoint: {e}")))?;
        let access_key = access_key
            .ok_or_else(|| AcsError::ConnectionString("missing `accesskey`".to_string()))
            .and_then(|k| {
                BASE64_STANDARD.decode(k).map_err(|_| {
                    AcsError::ConnectionString("`accesskey` is not base64".to_string())
                })
            })?;

        Ok(ConnectionString {
            endpoint,
            access_key,
        })
    }

    pub(crate) fn access_key(&self) -> &[u8] {
        &self.access_key
    }
}

pub(crate) struct SignedHeaders {
    pub date: String,
    pub content_hash: String,
    pub authorization: String,
}

/// Signs a request the way Communication Services expects: HMAC-SHA256 over the
/// verb, path and query, date, host and the SHA-256 of the body.
pub(crate) fn sign(
    key: &[u8],
    method: &Method,
    url: &Url,
    body: &[u8],
) -> Result<SignedHeaders, AcsError> {
    sign_at(key, method, url, body, Utc::now())
}

fn sign_at(
    key: &[u8],
    method: &Method,
    url: &Url,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedHeaders, AcsError> {
    let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let content_hash = BASE64_STANDARD.encode(Sha256::digest(body));
    let payload = string_to_sign(method, url, &date, &content_hash);

    let mut hasher = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|_| AcsError::InvalidInput("invalid access key length".to_string()))?;
    hasher.update(payload.as_bytes());
    let signature = BASE64_STANDARD.encode(hasher.finalize().into_bytes());

    Ok(SignedHeaders {
        authorization: format!(
            "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}"
        ),
        date,
        content_hash,
    })
}

fn string_to_sign(method: &Method, url: &Url, date: &str, content_hash: &str) -> String {
    let host = &url[Position::BeforeHost..Position::AfterPort];
    let path_and_query = &url[Position::BeforePath..Position::AfterQuery];
    format!("{}\n{path_and_query}\n{date};{host};{content_hash}", method.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_connection_string_case_insensitively() {
        let parsed =
            ConnectionString::parse("Endpoint=https://acs.example/; AccessKey=c2VjcmV0;").unwrap();

        assert_eq!(parsed.endpoint.as_str(), "https://acs.example/");
        assert_eq!(parsed.access_key(), b"secret");
    }

    #[test]
    fn keeps_base64_padding_in_access_key() {
        let parsed = ConnectionString::parse("endpoint=https://acs.example/;accesskey=a2V5MQ==")
            .unwrap();

        assert_eq!(parsed.access_key(), b"key1");
    }

    #[test]
    fn rejects_incomplete_connection_strings() {
        assert!(matches!(
            ConnectionString::parse("accesskey=c2VjcmV0"),
            Err(AcsError::ConnectionString(_))
        ));
        assert!(matches!(
            ConnectionString::parse("endpoint=https://acs.example/"),
            Err(AcsError::ConnectionString(_))
        ));
        assert!(matches!(
            ConnectionString::parse("endpoint=https://acs.example/;accesskey=not base64!"),
            Err(AcsError::ConnectionString(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let parsed = ConnectionString::parse("endpoint=https://acs.example/;accesskey=c2VjcmV0")
            .unwrap();

        assert!(!format!("{parsed:?}").contains("c2VjcmV0"));
    }

    #[test]
    fn string_to_sign_covers_path_query_and_host() {
        let url = Url::parse("https://acs.example:8443/calling/recordings?api-version=1").unwrap();

        assert_eq!(
            string_to_sign(&Method::POST, &url, "DATE", "HASH"),
            "POST\n/calling/recordings?api-version=1\nDATE;acs.example:8443;HASH"
        );
    }

    #[test]
    fn signed_headers_use_rfc1123_date_and_body_hash() {
        let url = Url::parse("https://acs.example/rooms?api-version=1").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();

        let signed = sign_at(b"secret", &Method::GET, &url, b"", now).unwrap();

        assert_eq!(signed.date, "Tue, 05 Mar 2024 07:08:09 GMT");
        // SHA-256 of the empty body
        assert_eq!(
            signed.content_hash,
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert!(signed
            .authorization
            .starts_with("HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature="));
    }
}
