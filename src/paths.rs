//! Path string helpers shared by the catalog, matcher and audits.
//!
//! Catalog paths come from another machine (often Windows or UNC), so they
//! are handled as strings and never through `std::path`.

/// Split on either separator, dropping empty segments.
pub fn path_components(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|c| !c.is_empty()).collect()
}

/// Canonical form for equality and prefix tests: forward slashes, trimmed,
/// lowercase, with exactly one trailing `/`. Empty stays empty.
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return String::new();
    }
    let mut normalized = normalized.trim_end_matches('/').to_lowercase();
    normalized.push('/');
    normalized
}

/// Join `base` and a relative directory with `/`, keeping a trailing `/`.
/// Leading separators of `base` (UNC `\\host`) are preserved.
pub fn join_dir(base: &str, relative: &str) -> String {
    let base = base.replace('\\', "/");
    let relative = relative.replace('\\', "/");
    let relative = relative.trim_matches('/');

    let mut joined = base.trim_end_matches('/').to_string();
    if !relative.is_empty() {
        joined.push('/');
        joined.push_str(relative);
    }
    joined.push('/');
    joined
}

/// Case-insensitive prefix test on normalized paths.
pub fn is_under(path: &str, base: &str) -> bool {
    normalize_path(path).starts_with(&normalize_path(base))
}
