//! Filter evaluation: turns a [`Filter`] into a scan over one bucket.

use parlor_index::{fold, index_bucket_name};
use parlor_schema::{SchemaResult, TypeDescriptor};
use parlor_types::Filter;
use tracing::debug;

/// How `list` finds candidate records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryPlan {
    /// Decode every record in the primary bucket.
    FullScan,
    /// Point lookup in a unique index.
    Exact { bucket: String, key: String },
    /// Every index key starting with `prefix`.
    Prefix { bucket: String, prefix: String },
    /// Non-unique index entries whose value is exactly `value`: keys of the
    /// form `value->pk`.
    Matching { bucket: String, value: String },
}

impl QueryPlan {
    /// Plan a filter against `desc`.
    ///
    /// A filter naming no field, an unknown field or a field without an
    /// index falls back to a full scan. For a non-unique index an exact
    /// match scans the keys starting with `mask->` and keeps only those
    /// that are exactly `mask->pk`; a value such as `mask->more` shares the
    /// prefix but not the value.
    pub fn for_filter(desc: &TypeDescriptor, filter: &Filter) -> SchemaResult<Self> {
        let Some(path) = filter.field_name() else {
            return Ok(Self::FullScan);
        };
        let Some((bucket_path, field)) = desc.field_path(path)? else {
            debug!(type_name = desc.name(), field = path, "unknown filter field, scanning");
            return Ok(Self::FullScan);
        };
        if !field.is_indexed() {
            debug!(type_name = desc.name(), field = path, "filter field not indexed, scanning");
            return Ok(Self::FullScan);
        }

        let bucket = index_bucket_name(&bucket_path, &field.name);
        let mask = fold(field, &filter.mask);
        Ok(match (filter.seek, field.is_unique()) {
            (true, _) => Self::Prefix {
                bucket,
                prefix: mask,
            },
            (false, true) => Self::Exact { bucket, key: mask },
            (false, false) => Self::Matching {
                bucket,
                value: mask,
            },
        })
    }

    pub fn is_full_scan(&self) -> bool {
        matches!(self, Self::FullScan)
    }
}
