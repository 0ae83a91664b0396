//! Bucket naming and index key layout.
//!
//! Every record type owns one primary bucket named after the type. Each
//! indexed field reachable from the type owns one index bucket named
//! `idx_<path>.<field>`, where `<path>` is the type name followed by the
//! names of any intermediate structured fields, joined by dots.

use parlor_schema::FieldDescriptor;
use redb::TableDefinition;

/// Prefix shared by every index bucket.
pub const INDEX_PREFIX: &str = "idx_";

/// Separates the indexed value from the primary key in non-unique keys.
pub const NON_UNIQUE_DELIMITER: &str = "->";

/// Primary bucket: primary key -> JSON document.
pub fn primary_table(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

/// Index bucket: index key -> primary key.
pub fn index_table(name: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(name)
}

pub fn index_bucket_name(path: &str, field: &str) -> String {
    format!("{INDEX_PREFIX}{path}.{field}")
}

/// Prefix of every index bucket derived from `type_name`, nested paths
/// included.
pub fn type_index_prefix(type_name: &str) -> String {
    format!("{INDEX_PREFIX}{type_name}.")
}

/// Apply the field's case folding to an indexed value or a query mask.
pub fn fold(field: &FieldDescriptor, value: &str) -> String {
    if field.is_case_insensitive() {
        value.to_lowercase()
    } else {
        value.to_string()
    }
}

/// Key under which `value` is indexed for the record `pk`.
///
/// Unique indexes key on the (folded) value alone; non-unique indexes append
/// the delimiter and the primary key so several records can share a value.
pub fn index_key(field: &FieldDescriptor, value: &str, pk: &str) -> String {
    let folded = fold(field, value);
    if field.is_unique() {
        folded
    } else {
        format!("{folded}{NON_UNIQUE_DELIMITER}{pk}")
    }
}
