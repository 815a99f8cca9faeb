//! Webhook authenticity check.
//!
//! The provider signs each webhook with HMAC-SHA1 keyed by the account auth
//! token. The signed data is the callback URL followed by every POST
//! parameter as `key` + `value`, parameters sorted by key. The base64 digest
//! arrives in the `X-Twilio-Signature` header.

use base64::prelude::*;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

type HmacSha1 = Hmac<Sha1>;

/// Decoded form parameters, in body order.
pub type FormParams = Vec<(String, String)>;

/// Parse an `application/x-www-form-urlencoded` body. `+` decodes to a space;
/// pairs that fail to percent-decode as UTF-8 are dropped.
pub fn parse_form(body: &str) -> FormParams {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some((decode(key)?, decode(value)?))
        })
        .collect()
}

fn decode(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|s| s.into_owned())
}

/// Compute the base64 signature the provider would send for these parameters.
pub fn sign(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    BASE64_STANDARD.encode(mac.finalize().into_bytes())
}

/// Check a provided signature against the expected one in constant time.
pub fn validate(auth_token: &str, url: &str, params: &[(String, String)], provided: &str) -> bool {
    let expected = sign(auth_token, url, params);
    expected.as_bytes().ct_eq(provided.trim().as_bytes()).into()
}
