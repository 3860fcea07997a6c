//! Listing options and result pages for bucket enumeration.

use super::object::StorageObject;

/// Options for a single page of a bucket listing.
///
/// `prefix` is combined with (never replaces) the configured bucket prefix.
/// Re-running a listing with the same options plus `page_token` resumes it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub page_token: Option<String>,
    pub max_results: Option<usize>,
}

impl ListOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Directory-style listing of the entries directly under `prefix`.
    pub fn directory(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            delimiter: Some("/".into()),
            ..Self::default()
        }
    }
}

/// One page of a listing.
#[derive(Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<StorageObject>,
    /// Common prefixes ("subdirectories"), fully resolved and ending with the delimiter.
    pub prefixes: Vec<String>,
    /// `None` once the listing is exhausted.
    pub next_page_token: Option<String>,
}

impl ObjectPage {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.prefixes.is_empty()
    }
}
