//! Path algebra for media-relative paths and bucket object keys.
//!
//! Every component that needs to turn a media path into an object key (or
//! back) goes through [`PathResolver`]; nothing else concatenates separators.

use std::path::Path;

use crate::errors::{StorageError, StorageResult};

pub const SEPARATOR: char = '/';

const MAX_OBJECT_KEY_LEN: usize = 1024;
const TMP_SEGMENT: &str = "tmp";

/// Maps logical media paths to object keys under an optional bucket prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathResolver {
    prefix: Option<String>,
}

impl PathResolver {
    /// A prefix made only of whitespace or separators counts as no prefix.
    pub fn new(raw_prefix: &str) -> Self {
        let normalized = normalize(raw_prefix);
        Self {
            prefix: (!normalized.is_empty()).then_some(normalized),
        }
    }

    pub fn has_prefix(&self) -> bool {
        self.prefix.is_some()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Resolve a media-relative path into its object key.
    ///
    /// Paths that are already prefix-qualified are returned normalized, so
    /// `resolve(resolve(p)) == resolve(p)`.
    pub fn resolve(&self, path: &str) -> String {
        let relative = normalize(path);
        match &self.prefix {
            None => relative,
            Some(prefix) if relative.is_empty() => prefix.clone(),
            Some(prefix) if is_within(&relative, prefix) => relative,
            Some(prefix) => format!("{}{}{}", prefix, SEPARATOR, relative),
        }
    }

    /// Inverse of [`resolve`](Self::resolve) for keys coming back from listings.
    pub fn strip_prefix(&self, key: &str) -> String {
        let key = normalize(key);
        match &self.prefix {
            Some(prefix) if key == *prefix => String::new(),
            Some(prefix) if is_within(&key, prefix) => key[prefix.len() + 1..].to_string(),
            _ => key,
        }
    }
}

fn is_within(key: &str, prefix: &str) -> bool {
    key == prefix
        || (key.len() > prefix.len()
            && key.starts_with(prefix)
            && key[prefix.len()..].starts_with(SEPARATOR))
}

/// Canonical form: no surrounding whitespace, no empty or blank segments, no
/// leading or trailing separator. `normalize(normalize(p)) == normalize(p)`.
pub fn normalize(path: &str) -> String {
    path.split(SEPARATOR)
        .filter(|segment| !segment.trim().is_empty())
        .collect::<Vec<_>>()
        .join("/")
        .trim()
        .to_string()
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty keys, `.`/`..` segments, control characters and backslashes.
pub fn ensure_key_safe(path: &str) -> StorageResult<()> {
    let key = normalize(path);
    let invalid = || StorageError::InvalidObjectKey(path.to_string());

    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(invalid());
    }
    if key
        .split(SEPARATOR)
        .any(|segment| segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(invalid());
    }
    Ok(())
}

/// True if any segment of `path` is exactly `tmp`.
pub fn has_tmp_segment(path: &str) -> bool {
    normalize(path)
        .split(SEPARATOR)
        .any(|segment| segment == TMP_SEGMENT)
}

/// True if the last segment carries a file extension (`name.ext`).
pub fn has_extension(path: &str) -> bool {
    let normalized = normalize(path);
    let basename = normalized.rsplit(SEPARATOR).next().unwrap_or_default();
    matches!(basename.rsplit_once('.'), Some((stem, ext)) if !stem.is_empty() && !ext.is_empty())
}

/// `base/path` with exactly one separator between the two.
pub fn join(base: &str, path: &str) -> String {
    format!(
        "{}{}{}",
        base.trim_end_matches(SEPARATOR),
        SEPARATOR,
        path.trim_start_matches(SEPARATOR)
    )
}

/// Strip the media base directory from an absolute filesystem path.
///
/// Paths outside the media directory are only normalized.
pub fn media_relative(path: &str, media_base: &Path) -> String {
    let base = media_base.to_string_lossy();
    let base = base.trim_end_matches(SEPARATOR);
    match path.strip_prefix(base) {
        Some(rest) if !base.is_empty() && (rest.is_empty() || rest.starts_with(SEPARATOR)) => {
            normalize(rest)
        }
        _ => normalize(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_trims_separators() {
        assert_eq!(normalize("//catalog///product/a.jpg/"), "catalog/product/a.jpg");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("///"), "");
    }

    #[test]
    fn normalize_drops_blank_segments_and_edge_whitespace() {
        assert_eq!(normalize("/ a.jpg"), "a.jpg");
        assert_eq!(normalize("a/ /"), "a");
        assert_eq!(normalize(" x / y.jpg "), "x / y.jpg");
        for raw in ["/ a.jpg", "a/ /", "x/ /", " / /b/ c.jpg/ "] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn resolve_is_stable_around_whitespace_segments() {
        let plain = PathResolver::new("");
        assert_eq!(plain.resolve("/ a.jpg"), "a.jpg");

        let prefixed = PathResolver::new("media");
        let once = prefixed.resolve("x/ /");
        assert_eq!(once, "media/x");
        assert_eq!(prefixed.resolve(&once), once);
    }

    #[test]
    fn resolve_without_prefix_passes_normalized_path_through() {
        let resolver = PathResolver::new("  ");
        assert!(!resolver.has_prefix());
        assert_eq!(resolver.resolve("/img//a.jpg"), "img/a.jpg");
    }

    #[test]
    fn resolve_prepends_normalized_prefix() {
        let resolver = PathResolver::new("//media//prod/");
        assert_eq!(resolver.prefix(), Some("media/prod"));
        assert_eq!(resolver.resolve("/img/a.jpg"), "media/prod/img/a.jpg");
    }

    #[test]
    fn resolve_empty_path_yields_prefix_alone() {
        let resolver = PathResolver::new("media/");
        assert_eq!(resolver.resolve(""), "media");
        assert_eq!(resolver.resolve("/"), "media");
    }

    #[test]
    fn resolve_does_not_prefix_twice() {
        let resolver = PathResolver::new("media");
        let once = resolver.resolve("img/a.jpg");
        assert_eq!(resolver.resolve(&once), once);
        // sharing the first characters is not the same as being prefixed
        assert_eq!(resolver.resolve("mediabank/a.jpg"), "media/mediabank/a.jpg");
    }

    #[test]
    fn strip_prefix_inverts_resolve() {
        let resolver = PathResolver::new("media");
        assert_eq!(resolver.strip_prefix("media/img/a.jpg"), "img/a.jpg");
        assert_eq!(resolver.strip_prefix("media"), "");
        assert_eq!(resolver.strip_prefix("other/a.jpg"), "other/a.jpg");
    }

    #[test]
    fn key_safety_rejects_traversal_and_control_bytes() {
        assert!(ensure_key_safe("catalog/a.jpg").is_ok());
        assert!(ensure_key_safe("catalog/../etc/passwd").is_err());
        assert!(ensure_key_safe("./a.jpg").is_err());
        assert!(ensure_key_safe("a\\b.jpg").is_err());
        assert!(ensure_key_safe("a\nb.jpg").is_err());
        assert!(ensure_key_safe("//").is_err());
        assert!(ensure_key_safe(&"a".repeat(1025)).is_err());
    }

    #[test]
    fn structural_predicates() {
        assert!(has_tmp_segment("cache/tmp/x.jpg"));
        assert!(!has_tmp_segment("cache/tmpl/x.jpg"));
        assert!(has_extension("catalog/product/a.jpg"));
        assert!(!has_extension("catalog/product"));
        assert!(!has_extension("catalog/.htaccess"));
        assert!(!has_extension("catalog/file."));
    }

    #[test]
    fn media_relative_strips_base_directory() {
        let base = Path::new("/srv/shop/pub/media/");
        assert_eq!(
            media_relative("/srv/shop/pub/media/catalog/a.jpg", base),
            "catalog/a.jpg"
        );
        assert_eq!(media_relative("catalog/a.jpg", base), "catalog/a.jpg");
        assert_eq!(
            media_relative("/srv/shop/pub/mediabank/a.jpg", base),
            "srv/shop/pub/mediabank/a.jpg"
        );
    }

    #[test]
    fn join_uses_single_separator() {
        assert_eq!(join("catalog/", "/a.jpg"), "catalog/a.jpg");
        assert_eq!(join("catalog", "a.jpg"), "catalog/a.jpg");
    }
}
