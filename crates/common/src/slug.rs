// Slug derivation: NFKC normalization, lowercase, hyphen collapsing, 64 char max.

use unicode_normalization::UnicodeNormalization;

/// Maximum slug length in bytes (slugs are ASCII after filtering).
const MAX_SLUG_LEN: usize = 64;

/// Derive a filesystem- and URL-safe slug from a human-readable name.
///
/// Rules:
/// - Apply Unicode NFKC normalization, then lowercase
/// - Whitespace and hyphen runs collapse into a single hyphen
/// - Any other character outside `[a-z0-9]` is dropped
/// - Leading/trailing hyphens are trimmed
/// - Truncate to 64 characters, re-trimming a trailing hyphen
///
/// Deterministic and pure; collision handling is the workspace manager's job.
pub fn slugify(name: &str) -> String {
    let normalized: String = name.nfkc().collect();

    let mut slug = String::with_capacity(normalized.len());
    let mut pending_hyphen = false;
    for ch in normalized.to_lowercase().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_hyphen = !slug.is_empty();
            continue;
        }
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen {
                slug.push('-');
                pending_hyphen = false;
            }
            slug.push(ch);
        }
        // Everything else is dropped without producing a separator.
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}
