//! URL and path helpers used by the externals resolver and the repository
//! facade: URL joining with `..` collapsing, percent-encoding paths for
//! the `svn` CLI, recursive-external detection, and a memoized
//! head-revision-at-date lookup.

use std::collections::HashMap;
use std::sync::Mutex;

/// Join an SVN URL with one or more path segments, collapsing `.`/`..`
/// components the way `os.path.abspath` does in the original
/// `svn_urljoin`. Unlike a generic URL join, SVN externals routinely use
/// `../../other` segments relative to the *directory carrying the
/// property*, so this operates on the path portion only and reattaches
/// the scheme+host.
pub fn svn_urljoin(base_url: &str, segments: &[&str]) -> String {
    let (prefix, path) = split_scheme(base_url);
    let mut components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for seg in segments {
        for part in seg.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    components.pop();
                }
                other => components.push(other),
            }
        }
    }
    format!("{}/{}", prefix.trim_end_matches('/'), components.join("/"))
}

fn split_scheme(url: &str) -> (&str, &str) {
    if let Some(pos) = url.find("://") {
        let after = pos + 3;
        if let Some(slash) = url[after..].find('/') {
            return (&url[..after + slash], &url[after + slash..]);
        }
        return (url, "");
    }
    ("", url)
}

/// Percent-encode an SVN URL's path component so it is safe to pass to the
/// `svn` CLI, matching `utils.py::quote_svn_url`. Only the characters SVN
/// itself refuses to accept unescaped are encoded; the scheme+host prefix
/// is left untouched.
pub fn quote_svn_url(url: &str) -> String {
    let (prefix, path) = split_scheme(url);
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            ' ' | '%' | '"' | '<' | '>' | '`' => {
                for byte in ch.to_string().as_bytes() {
                    out.push_str(&format!("%{:02X}", byte));
                }
            }
            _ => out.push(ch),
        }
    }
    format!("{}{}", prefix, out)
}

/// True if `external_url` (resolved against `origin_url` when relative)
/// would check the external out into a path that is an ancestor or
/// descendant of the directory it is declared in — i.e. loading it would
/// recurse into the same repository tree forever.
///
/// Mirrors `utils.py::is_recursive_external`.
pub fn is_recursive_external(
    origin_url: &str,
    dir_path: &str,
    external_path: &str,
    external_url: &str,
) -> bool {
    let resolved = if is_relative_external_url(external_url) {
        resolve_relative_external_url(origin_url, external_url)
    } else {
        external_url.to_string()
    };
    let target_dir = svn_urljoin(origin_url, &[dir_path, external_path]);
    let resolved = resolved.trim_end_matches('/');
    let target_dir = target_dir.trim_end_matches('/');
    resolved == target_dir || target_dir.starts_with(&format!("{}/", resolved))
}

pub fn is_relative_external_url(url: &str) -> bool {
    url.starts_with("../") || url.starts_with("^/") || url.starts_with("//") || url.starts_with('/')
}

pub fn resolve_relative_external_url(origin_url: &str, external_url: &str) -> String {
    if let Some(rest) = external_url.strip_prefix("^/") {
        return svn_urljoin(origin_url, &[rest]);
    }
    if let Some(rest) = external_url.strip_prefix("//") {
        // Scheme-relative: same scheme, different host+path; approximate by
        // keeping our scheme and replacing everything after it.
        let (prefix, _) = split_scheme(origin_url);
        let scheme = prefix.split("://").next().unwrap_or("https");
        return format!("{}://{}", scheme, rest);
    }
    svn_urljoin(origin_url, &[external_url])
}

/// Memoized lookup of the revision whose commit date is the latest one
/// not after `at`. Backed by a plain mutex-guarded cache since the
/// this crate carries no async-aware LRU dependency; entries are cheap
/// (one `i64` per date) so unbounded growth across one loader run is
/// acceptable.
#[derive(Debug, Default)]
pub struct HeadAtDateCache {
    cache: Mutex<HashMap<i64, i64>>,
}

impl HeadAtDateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, epoch_secs: i64) -> Option<i64> {
        self.cache.lock().unwrap().get(&epoch_secs).copied()
    }

    pub fn insert(&self, epoch_secs: i64, revision: i64) {
        self.cache.lock().unwrap().insert(epoch_secs, revision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svn_urljoin_collapses_dotdot() {
        let joined = svn_urljoin("https://svn.example.com/repo/trunk/sub", &["../../other"]);
        assert_eq!(joined, "https://svn.example.com/repo/other");
    }

    #[test]
    fn test_svn_urljoin_simple_append() {
        let joined = svn_urljoin("https://svn.example.com/repo", &["trunk", "lib"]);
        assert_eq!(joined, "https://svn.example.com/repo/trunk/lib");
    }

    #[test]
    fn test_quote_svn_url_encodes_spaces() {
        let quoted = quote_svn_url("https://svn.example.com/repo/my file.txt");
        assert!(quoted.contains("%20"));
    }

    #[test]
    fn test_is_recursive_external_detects_self_reference() {
        let recursive = is_recursive_external(
            "https://svn.example.com/repo/trunk",
            "",
            "vendor/self",
            "^/trunk/vendor",
        );
        assert!(recursive);
    }

    #[test]
    fn test_is_recursive_external_false_for_unrelated_external() {
        let recursive = is_recursive_external(
            "https://svn.example.com/repo/trunk",
            "",
            "vendor/lib",
            "https://svn.example.com/other-repo/lib",
        );
        assert!(!recursive);
    }

    #[test]
    fn test_resolve_relative_external_url_caret() {
        let resolved = resolve_relative_external_url("https://svn.example.com/repo/trunk", "^/lib/vendor");
        assert_eq!(resolved, "https://svn.example.com/repo/trunk/lib/vendor");
    }

    #[test]
    fn test_resolve_relative_external_url_dotdot() {
        let resolved = resolve_relative_external_url("https://svn.example.com/repo/trunk", "../other/lib");
        assert_eq!(resolved, "https://svn.example.com/repo/other/lib");
    }

    #[test]
    fn test_head_at_date_cache_roundtrip() {
        let cache = HeadAtDateCache::new();
        assert_eq!(cache.get(1000), None);
        cache.insert(1000, 42);
        assert_eq!(cache.get(1000), Some(42));
    }
}
