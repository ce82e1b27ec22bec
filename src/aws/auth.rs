//! # AWS Authentication
//!
//! Finds credentials and a region the way the AWS CLI does (environment first,
//! then the shared `~/.aws` files) and signs requests with Signature Version 4.
//!
//! Signing follows the documented four steps:
//! 1. Build the canonical request (method, path, query, sorted headers, payload hash).
//! 2. Build the string to sign from the timestamp, credential scope and the
//!    canonical request hash.
//! 3. Derive the signing key by chaining HMAC-SHA256 over date, region, service.
//! 4. Sign and assemble the `Authorization` header.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::aws::types::Credentials;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const DEFAULT_PROFILE: &str = "default";

type HmacSha256 = Hmac<Sha256>;

/// Resolves credentials from the environment, then the shared credentials file.
pub fn resolve_credentials() -> Result<Credentials> {
    if let Some(credentials) = credentials_from_env(|k| std::env::var(k).ok()) {
        return Ok(credentials);
    }
    let path = match std::env::var_os("AWS_SHARED_CREDENTIALS_FILE") {
        Some(p) => PathBuf::from(p),
        None => aws_dir()?.join("credentials"),
    };
    let text = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "No AWS credentials in the environment and failed to read {}",
            path.display()
        )
    })?;
    let profile = profile_name();
    credentials_from_profile(&text, &profile)
        .with_context(|| format!("Profile [{}] in {}", profile, path.display()))
}

/// Picks the region: explicit override, `AWS_REGION`, `AWS_DEFAULT_REGION`,
/// then the `region` of the active profile in `~/.aws/config`.
pub fn resolve_region(explicit: Option<&str>) -> Result<String> {
    if let Some(region) = explicit.filter(|r| !r.is_empty()) {
        return Ok(region.to_string());
    }
    for var in ["AWS_REGION", "AWS_DEFAULT_REGION"] {
        if let Ok(region) = std::env::var(var)
            && !region.is_empty()
        {
            return Ok(region);
        }
    }
    let path = match std::env::var_os("AWS_CONFIG_FILE") {
        Some(p) => PathBuf::from(p),
        None => aws_dir()?.join("config"),
    };
    let text = std::fs::read_to_string(&path).ok();
    text.and_then(|t| region_from_config(&t, &profile_name()))
        .context("No AWS region configured (set \"region\" in aws_config.json or AWS_REGION)")
}

fn profile_name() -> String {
    std::env::var("AWS_PROFILE").unwrap_or_else(|_| DEFAULT_PROFILE.to_string())
}

fn aws_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME not set")?;
    Ok(PathBuf::from(home).join(".aws"))
}

pub fn credentials_from_env(var: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    let access_key_id = var("AWS_ACCESS_KEY_ID").filter(|v| !v.is_empty())?;
    let secret_access_key = var("AWS_SECRET_ACCESS_KEY").filter(|v| !v.is_empty())?;
    Some(Credentials {
        access_key_id,
        secret_access_key,
        session_token: var("AWS_SESSION_TOKEN").filter(|v| !v.is_empty()),
    })
}

pub fn credentials_from_profile(text: &str, profile: &str) -> Result<Credentials> {
    let Some(section) = ini_section(text, profile) else {
        bail!("profile not found");
    };
    let get = |k: &str| section.get(k).cloned().filter(|v| !v.is_empty());
    Ok(Credentials {
        access_key_id: get("aws_access_key_id").context("aws_access_key_id missing")?,
        secret_access_key: get("aws_secret_access_key")
            .context("aws_secret_access_key missing")?,
        session_token: get("aws_session_token"),
    })
}

/// In `~/.aws/config` every profile but `default` is written `[profile name]`.
pub fn region_from_config(text: &str, profile: &str) -> Option<String> {
    let section = if profile == DEFAULT_PROFILE {
        ini_section(text, profile)
    } else {
        ini_section(text, &format!("profile {}", profile))
    }?;
    section.get("region").cloned().filter(|r| !r.is_empty())
}

/// Key/value pairs of `[name]` in an INI-style AWS file.
fn ini_section(text: &str, name: &str) -> Option<HashMap<String, String>> {
    let mut current: Option<&str> = None;
    let mut found = false;
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(header.trim());
            found |= current == Some(name);
            continue;
        }
        if current == Some(name)
            && let Some((k, v)) = line.split_once('=')
        {
            out.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    found.then_some(out)
}

/// Request parts covered by the signature. Header names must be lowercase.
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Already canonical (sorted, URI-encoded) query string.
    pub query: &'a str,
    pub headers: &'a [(&'a str, String)],
    pub payload: &'a [u8],
}

/// `YYYYMMDD'T'HHMMSS'Z'`, the value of the `x-amz-date` header.
pub fn amz_date(time: DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Returns the canonical request and its `SignedHeaders` list.
pub fn canonical_request(req: &SignableRequest<'_>) -> (String, String) {
    let mut headers: Vec<(String, String)> = req
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        req.method,
        req.path,
        req.query,
        canonical_headers,
        signed_headers,
        sha256_hex(req.payload)
    );
    (canonical, signed_headers)
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Computes the `Authorization` header value for `req`.
///
/// `time` must be the same instant sent in `x-amz-date`.
pub fn authorization(
    req: &SignableRequest<'_>,
    credentials: &Credentials,
    region: &str,
    service: &str,
    time: DateTime<Utc>,
) -> String {
    let date = time.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let (canonical, signed_headers) = canonical_request(req);

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date(time),
        scope,
        sha256_hex(canonical.as_bytes())
    );
    let key = signing_key(&credentials.secret_access_key, &date, region, service);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    )
}
