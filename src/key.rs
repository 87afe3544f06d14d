//! Mapping between request URLs and logical resource keys.
//!
//! Cache entries are stored under absolute request URLs, the same way a
//! browser cache keys requests. The resource table speaks in logical keys:
//! paths relative to the origin, with `"/"` standing for the root document.

use reqwest::Url;

use crate::error::{Error, Result};

/// Logical key of the site root document.
pub const ROOT_KEY: &str = "/";

/// Query marker used for cache-busting; everything from it onward is ignored.
const VERSION_QUERY: &str = "?v=";

/// Validates `origin` and returns its serialized form (`scheme://host[:port]`).
///
/// Paths, queries and trailing slashes are dropped.
///
/// # Errors
///
/// Returns [`Error::InvalidOrigin`] if `origin` does not parse as an absolute
/// `http` or `https` URL.
pub fn normalize_origin(origin: &str) -> Result<String> {
    let url = Url::parse(origin.trim()).map_err(|e| Error::InvalidOrigin(format!("{origin}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::InvalidOrigin(origin.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

/// Returns the absolute URL under which `key` is requested and cached.
#[must_use]
pub fn canonical_url(origin: &str, key: &str) -> String {
    if key == ROOT_KEY {
        format!("{origin}/")
    } else {
        format!("{origin}/{key}")
    }
}

/// Derives the logical key for an intercepted request URL.
///
/// The origin is stripped, a `?v=` cache-busting suffix is cut off, and the
/// bare origin, an origin followed by a fragment, or an empty remainder all
/// map to [`ROOT_KEY`]. Returns `None` for URLs outside `origin`.
#[must_use]
pub fn request_key(url: &str, origin: &str) -> Option<String> {
    let rest = url.strip_prefix(origin)?;
    let path = if rest.is_empty() || rest.starts_with('#') {
        ""
    } else {
        rest.strip_prefix('/')?
    };
    let path = path.split_once(VERSION_QUERY).map_or(path, |(head, _)| head);
    if path.is_empty() || path.starts_with('#') {
        return Some(ROOT_KEY.to_string());
    }
    Some(path.to_string())
}

/// Derives the logical key of a stored cache entry from its request URL.
///
/// Unlike [`request_key`], queries are kept: entries are always stored under
/// canonical URLs, so anything else is a key the resource table won't know.
#[must_use]
pub fn stored_key(url: &str, origin: &str) -> Option<String> {
    let rest = url.strip_prefix(origin)?;
    if rest.is_empty() {
        return Some(ROOT_KEY.to_string());
    }
    match rest.strip_prefix('/')? {
        "" => Some(ROOT_KEY.to_string()),
        path => Some(path.to_string()),
    }
}
