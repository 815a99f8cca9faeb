//! AWS Signature Version 4 request signing for the IoT data plane.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signing name of the IoT data-plane API.
pub const IOT_DATA_SERVICE: &str = "iotdata";

pub struct Credentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
}

/// A request to sign. `path` is the unencoded path; `query` is already
/// URI-encoded `k=v` pairs joined by `&`.
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub body: &'a [u8],
}

/// Headers to attach to the outgoing request, `Authorization` included.
pub type SignedHeaders = Vec<(&'static str, String)>;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// URI-encode per AWS rules: unreserved characters pass, everything else is
/// `%XX`. Slashes are kept when encoding a path.
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &Credentials<'_>,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> SignedHeaders {
    let date = now.format("%Y%m%d").to_string();
    let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = sha256_hex(request.body);

    let mut headers: BTreeMap<&'static str, String> = BTreeMap::new();
    headers.insert("host", request.host.to_string());
    headers.insert("x-amz-date", datetime.clone());
    if let Some(token) = credentials.session_token {
        headers.insert("x-amz-security-token", token.to_string());
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{}\n", v.trim()))
        .collect();
    let signed_header_names = headers.keys().copied().collect::<Vec<_>>().join(";");

    let canonical_query = if request.query.is_empty() {
        String::new()
    } else {
        let mut pairs: Vec<&str> = request.query.split('&').collect();
        pairs.sort_unstable();
        pairs.join("&")
    };

    let canonical_request = format!(
        "{}\n{}\n{canonical_query}\n{canonical_headers}\n{signed_header_names}\n{payload_hash}",
        request.method,
        // Services other than S3 expect the already-encoded path encoded again.
        uri_encode(&uri_encode(request.path, false), false),
    );

    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{datetime}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes()),
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_header_names}, Signature={signature}",
        credentials.access_key_id,
    );

    let mut out = vec![("authorization", authorization), ("x-amz-date", datetime)];
    if let Some(token) = credentials.session_token {
        out.push(("x-amz-security-token", token.to_string()));
    }
    out
}
