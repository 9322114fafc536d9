use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use time::Duration;

/// Largest value written into a single cookie before splitting into chunks.
pub(crate) const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";

/// Attributes applied to every session cookie this crate writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub(crate) path: String,
    pub(crate) domain: Option<String>,
    pub(crate) same_site: SameSite,
    pub(crate) secure: bool,
    pub(crate) http_only: bool,
    pub(crate) max_age: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".into(),
            domain: None,
            same_site: SameSite::Lax,
            secure: true,
            http_only: true,
            max_age: Duration::days(400),
        }
    }
}

impl CookieOptions {
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Disable for plain-http local development only.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

/// Create a session cookie carrying `value`.
pub(crate) fn session_cookie(name: &str, value: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .http_only(options.http_only)
        .secure(options.secure)
        .same_site(options.same_site)
        .path(options.path.clone())
        .max_age(options.max_age);
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

/// Create removal cookie for `name`. Path and domain must match the original.
pub(crate) fn removal_cookie(name: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), ""))
        .path(options.path.clone())
        .max_age(Duration::ZERO);
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

pub(crate) fn encode_value(raw: &str) -> String {
    format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(raw))
}

/// Decode a stored cookie value. Values without the prefix are taken as-is.
pub(crate) fn decode_value(stored: &str) -> Option<String> {
    let Some(encoded) = stored.strip_prefix(BASE64_PREFIX) else {
        return Some(stored.to_string());
    };
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

pub(crate) fn chunk_name(key: &str, index: usize) -> String {
    format!("{key}.{index}")
}

/// `true` when `name` is `key` itself or one of its `key.N` chunks.
pub(crate) fn is_chunk_of(name: &str, key: &str) -> bool {
    if name == key {
        return true;
    }
    name.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|idx| !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()))
}

/// Split an encoded value into `(cookie name, cookie value)` pairs.
pub(crate) fn split_into_chunks(key: &str, encoded: &str) -> Vec<(String, String)> {
    if encoded.len() <= MAX_CHUNK_SIZE {
        return vec![(key.to_string(), encoded.to_string())];
    }
    // encoded values are ASCII, so byte chunks are valid UTF-8
    encoded
        .as_bytes()
        .chunks(MAX_CHUNK_SIZE)
        .enumerate()
        .map(|(i, chunk)| (chunk_name(key, i), String::from_utf8_lossy(chunk).into_owned()))
        .collect()
}

/// Reassemble the value stored under `key`, whole or chunked.
pub(crate) fn read_chunked(key: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(whole) = lookup(key) {
        return decode_value(&whole);
    }
    let mut combined = String::new();
    let mut index = 0;
    while let Some(part) = lookup(&chunk_name(key, index)) {
        combined.push_str(&part);
        index += 1;
    }
    if index == 0 {
        return None;
    }
    decode_value(&combined)
}
