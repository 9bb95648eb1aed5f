//! Best-effort mapping of human handles onto canonical provider identifiers.

use std::fmt;
use std::future::Future;

use tracing::debug;

use crate::backend::NamedResource;

/// Prefix that marks a value as an already-canonical provider identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdPrefix(&'static str);

/// Canonical zone identifiers look like `zon-abc12`.
pub const ZONE_ID: IdPrefix = IdPrefix("zon-");

/// Canonical server type identifiers look like `typ-abc12`.
pub const SERVER_TYPE_ID: IdPrefix = IdPrefix("typ-");

impl IdPrefix {
    /// Creates a prefix pattern.
    #[must_use]
    pub const fn new(prefix: &'static str) -> Self {
        Self(prefix)
    }

    /// Returns `true` when `value` is already in canonical form.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        value.starts_with(self.0)
    }
}

impl fmt::Display for IdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{}", self.0)
    }
}

/// Resolves `element` to a canonical identifier.
///
/// Absent values and values already matching `pattern` are returned as-is and
/// `fetch` is never called. Otherwise the collection is fetched once and the
/// entry whose handle equals `element` supplies the identifier. When nothing
/// matches the raw value passes through so the provider can reject it.
///
/// # Errors
///
/// Propagates the error returned by `fetch`.
pub async fn normalise_id<F, Fut, E>(
    fetch: F,
    element: Option<&str>,
    pattern: IdPrefix,
) -> Result<Option<String>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<NamedResource>, E>>,
{
    debug!(element = ?element, pattern = %pattern, "normalising identifier");
    let Some(value) = element else {
        return Ok(None);
    };
    if pattern.matches(value) {
        return Ok(Some(value.to_owned()));
    }

    let collection = fetch().await?;
    let resolved = collection
        .into_iter()
        .find(|entry| entry.handle == value)
        .map_or_else(|| value.to_owned(), |entry| entry.id);
    Ok(Some(resolved))
}
