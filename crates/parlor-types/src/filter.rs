use serde::{Deserialize, Serialize};

/// Query input for listing records.
///
/// - No `field`: full scan of the type's primary bucket.
/// - `field` naming an indexed field: index lookup. `mask` is an exact
///   value unless `seek` is set, in which case it is a prefix over the
///   stored index keys.
/// - `field` naming a field without an index: full scan, `mask` ignored.
///
/// Nested indexed fields are addressed with dotted paths, e.g.
/// `"Settings.Mode"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name (or dotted path) to look up through its index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Value, or value prefix when `seek` is set.
    #[serde(default)]
    pub mask: String,
    /// Maximum number of records to return; `0` means unlimited.
    #[serde(default)]
    pub limit: usize,
    /// Prefix ("seek") match instead of exact match.
    #[serde(default)]
    pub seek: bool,
}

impl Filter {
    /// A filter matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Exact match on an indexed field.
    pub fn by(field: impl Into<String>, mask: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            mask: mask.into(),
            ..Self::default()
        }
    }

    /// Prefix match on an indexed field.
    pub fn seek(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            seek: true,
            ..Self::by(field, prefix)
        }
    }

    /// Cap the number of returned records.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The field name, treating an empty string as "no field".
    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref().filter(|f| !f.is_empty())
    }
}
