//! Discovery orchestration and cache staleness.
//!
//! Field mappings are expensive to rebuild (several round trips), so the
//! last good mapping lives in the store with a timestamp and is reused
//! until it goes stale or a refresh is forced.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::tracker;
use crate::api::transport::Transport;
use crate::fields::normalize::{normalize_catalog, normalize_creation};
use crate::fields::{alias, normalize_name, CreateFieldInfo, FieldMap, IssueKind};

/// Default staleness threshold for the cached mapping
pub const DEFAULT_MAX_AGE_DAYS: u64 = 7;

/// Outcome of a discovery run
#[derive(Debug)]
pub struct Discovery {
    pub mapping: FieldMap,
    /// True when the mapping came from the flat catalog fallback and
    /// carries no per-kind information
    pub degraded: bool,
}

/// Whether a cached mapping needs refreshing. A missing or unparsable
/// timestamp counts as stale. `max_age_hours` takes precedence over
/// `max_age_days` when set.
pub fn is_stale(timestamp: Option<&str>, max_age_days: u64, max_age_hours: Option<u64>) -> bool {
    let Some(stamp) = timestamp else {
        return true;
    };
    let Ok(stored) = DateTime::parse_from_rfc3339(stamp) else {
        return true;
    };

    let age = Utc::now().signed_duration_since(stored.with_timezone(&Utc));
    match max_age_hours {
        Some(hours) => age > chrono::Duration::hours(hours as i64),
        None => age > chrono::Duration::days(max_age_days as i64),
    }
}

/// Run field discovery against the tracker.
///
/// Creation metadata is the primary source. If it fails in any way, or
/// comes back empty, discovery falls back to the flat field catalog.
/// An empty catalog is fatal and propagates as `ApiError::EmptyFieldCatalog`.
pub fn discover(transport: &dyn Transport, project: &str) -> Result<Discovery, ApiError> {
    match tracker::fetch_creation_metadata(transport, project, IssueKind::all()) {
        Ok(meta) => {
            let mapping = normalize_creation(&meta);
            if mapping.is_empty() {
                warn!(
                    "Creation metadata for {} was empty; falling back to field catalog",
                    project
                );
                return fallback(transport);
            }
            Ok(Discovery {
                mapping,
                degraded: false,
            })
        }
        Err(err) => {
            warn!(
                "Creation metadata unavailable ({}); falling back to field catalog",
                err
            );
            fallback(transport)
        }
    }
}

fn fallback(transport: &dyn Transport) -> Result<Discovery, ApiError> {
    let catalog = tracker::fetch_all_fields(transport)?;
    debug!("Built degraded mapping from {} catalog fields", catalog.len());
    Ok(Discovery {
        mapping: normalize_catalog(&catalog),
        degraded: true,
    })
}

/// Wire id for a user-supplied field name, alias-aware
pub fn field_id(map: &FieldMap, name: &str) -> Option<String> {
    field_info(map, name).map(|info| info.id.clone())
}

/// Field info for a user-supplied field name, alias-aware
pub fn field_info<'a>(map: &'a FieldMap, name: &str) -> Option<&'a CreateFieldInfo> {
    alias::field_with_alias(map, &normalize_name(name))
}
