//! Name resolution for data sources.
//!
//! Data sources look remote objects up by a human-supplied name pattern. The
//! pattern is a regular expression matched anywhere in the entity name, so
//! `Ubuntu 18.04.1 LTS` selects `Ubuntu 18.04.1 LTS Desktop Firstboot`. Note
//! this is substring containment, not full-name matching: callers wanting an
//! exact match must anchor the pattern themselves (`^name$`).
//!
//! When several entities match, the caller decides between failing and
//! picking the most recently created one.

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::ResolveError;

/// Format of Skytap `created_at` timestamps, e.g. `2023/06/01 00:00:00 +0000`.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S %z";

/// A remote object that can be looked up by name.
pub trait NamedEntity {
    /// Human-readable kind used in error messages (e.g. `template`).
    const KIND: &'static str;

    /// Opaque identifier.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Raw creation timestamp, if the API returned one.
    fn created_at(&self) -> Option<&str>;
}

/// Resolve `pattern` to exactly one entity.
///
/// With `allow_ambiguous` set, multiple matches are narrowed to the one with
/// the latest `created_at`. Unparseable or missing timestamps rank as the
/// oldest possible time, and equal timestamps keep the input order.
pub fn resolve<'a, T: NamedEntity>(
    entities: &'a [T],
    pattern: &str,
    allow_ambiguous: bool,
) -> Result<&'a T, ResolveError> {
    let re = Regex::new(pattern).map_err(|source| ResolveError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;

    // An empty match (e.g. `x*` against "Ubuntu") does not count.
    let matches: Vec<&T> = entities
        .iter()
        .filter(|e| re.find(e.name()).is_some_and(|m| !m.as_str().is_empty()))
        .collect();

    match matches.len() {
        0 => Err(ResolveError::NotFound {
            kind: T::KIND,
            pattern: pattern.to_string(),
        }),
        1 => Ok(matches[0]),
        count if !allow_ambiguous => Err(ResolveError::Ambiguous {
            kind: T::KIND,
            pattern: pattern.to_string(),
            count,
        }),
        _ => Ok(most_recent(matches)),
    }
}

fn most_recent<T: NamedEntity>(candidates: Vec<&T>) -> &T {
    let mut ranked: Vec<(DateTime<Utc>, &T)> = candidates
        .into_iter()
        .map(|e| (parse_created_at(e.created_at()), e))
        .collect();
    // sort_by is stable, so ties keep their input order
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked[0].1
}

/// Parse a Skytap timestamp, mapping anything unparseable to the earliest time.
pub fn parse_created_at(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
