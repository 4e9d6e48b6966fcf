//! Hand-rolled parsers for `svn --xml` output.
//!
//! `svn`'s XML is small and regular enough that a real XML crate buys
//! little; this mirrors the string-scraping approach the CLI wrapper
//! already used for `svn info`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::SvnError;
use crate::models::{ChangeAction, ChangedPath, EntryKind, SvnLogEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvnInfo {
    pub root_url: String,
    pub uuid: String,
    pub latest_rev: i64,
    pub url: String,
}

pub fn parse_svn_info(xml: &str) -> Result<SvnInfo, SvnError> {
    debug!("parsing svn info XML ({} bytes)", xml.len());
    let url = extract_tag_content(xml, "url")
        .ok_or_else(|| SvnError::XmlParseError("missing <url> in svn info".into()))?;
    let root_url = extract_tag_content(xml, "root")
        .ok_or_else(|| SvnError::XmlParseError("missing <root> in svn info".into()))?;
    let uuid = extract_tag_content(xml, "uuid")
        .ok_or_else(|| SvnError::XmlParseError("missing <uuid> in svn info".into()))?;
    let latest_rev = extract_attribute(xml, "entry", "revision")
        .or_else(|| extract_attribute(xml, "commit", "revision"))
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| SvnError::XmlParseError("missing revision in svn info".into()))?;
    Ok(SvnInfo {
        root_url,
        uuid,
        latest_rev,
        url,
    })
}

/// Parse `svn log --xml --verbose` output into [`SvnLogEntry`] records.
///
/// `root_relative_path` is the loaded root's path relative to the
/// repository root (e.g. `trunk` for a sub-project load, or `""` when
/// loading the whole repository); it drives the `has_changes` heuristic
/// from `svn_repo.py::_revision_data`: a changed path counts if it is
/// under the root, or is an ancestor of the root that was itself copied
/// from somewhere (a copy of a parent directory can implicitly create the
/// root).
pub fn parse_svn_log(xml: &str, root_relative_path: &str) -> Result<Vec<SvnLogEntry>, SvnError> {
    debug!("parsing svn log XML ({} bytes)", xml.len());
    let mut entries = Vec::new();
    let parts: Vec<&str> = xml.split("<logentry").collect();
    for part in parts.iter().skip(1) {
        let entry_xml = match part.find("</logentry>") {
            Some(pos) => &part[..pos],
            None => part,
        };
        let revision = extract_attribute_from_fragment(entry_xml, "revision")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let author = extract_tag_content(entry_xml, "author").unwrap_or_else(|| "(no author)".into());
        let date = extract_tag_content(entry_xml, "date").unwrap_or_default();
        let author_date = parse_svn_date(&date);
        let message = unescape_xml(&extract_tag_content(entry_xml, "msg").unwrap_or_default())
            .into_bytes();
        let changed_paths = parse_changed_paths(entry_xml);
        let has_changes = changed_paths.iter().any(|p| {
            path_is_under_root(&p.path, root_relative_path)
                || (p.copyfrom_rev.is_some() && path_is_ancestor_of_root(&p.path, root_relative_path))
        });
        entries.push(SvnLogEntry {
            rev: revision,
            author,
            author_date,
            message,
            changed_paths,
            has_changes,
        });
    }
    debug!(count = entries.len(), "parsed svn log entries");
    Ok(entries)
}

fn path_is_under_root(path: &str, root: &str) -> bool {
    if root.is_empty() {
        return true;
    }
    let path = path.trim_start_matches('/');
    let root = root.trim_start_matches('/').trim_end_matches('/');
    path == root || path.starts_with(&format!("{}/", root))
}

fn path_is_ancestor_of_root(path: &str, root: &str) -> bool {
    if root.is_empty() {
        return false;
    }
    let path = path.trim_start_matches('/').trim_end_matches('/');
    let root = root.trim_start_matches('/');
    !path.is_empty() && root.starts_with(&format!("{}/", path))
}

/// Parse an SVN XML date (`2025-01-10T12:34:56.000000Z`) into a UTC
/// timestamp, falling back to the Unix epoch for an empty/missing date —
/// the same fallback `converters.svn_date_to_swh_date` uses for the
/// synthetic r0 "repository creation" entry.
pub fn parse_svn_date(date: &str) -> DateTime<Utc> {
    if date.is_empty() {
        return Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);
    }
    DateTime::parse_from_rfc3339(date)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now))
}

pub fn parse_svn_diff_summarize(xml: &str) -> Result<Vec<ChangedPath>, SvnError> {
    debug!("parsing svn diff --summarize XML ({} bytes)", xml.len());
    parse_paths_block(xml, "<path ", "</path>")
}

fn extract_tag_content(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let start_pos = xml.find(&open)?;
    let after_open = &xml[start_pos + open.len()..];
    let content_start = after_open.find('>')? + 1;
    let content = &after_open[content_start..];
    let end_pos = content.find(&close)?;
    Some(content[..end_pos].trim().to_string())
}

fn extract_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let start_pos = xml.find(&open)?;
    let after_tag = &xml[start_pos + open.len()..];
    let tag_end = after_tag.find('>')?;
    extract_attr_from_str(&after_tag[..tag_end], attr)
}

fn extract_attribute_from_fragment(fragment: &str, attr: &str) -> Option<String> {
    extract_attr_from_str(fragment, attr)
}

fn extract_attr_from_str(s: &str, attr: &str) -> Option<String> {
    let pattern_dq = format!("{}=\"", attr);
    if let Some(pos) = s.find(&pattern_dq) {
        let after = &s[pos + pattern_dq.len()..];
        let end = after.find('"')?;
        return Some(after[..end].to_string());
    }
    let pattern_sq = format!("{}='", attr);
    if let Some(pos) = s.find(&pattern_sq) {
        let after = &s[pos + pattern_sq.len()..];
        let end = after.find('\'')?;
        return Some(after[..end].to_string());
    }
    None
}

fn parse_changed_paths(entry_xml: &str) -> Vec<ChangedPath> {
    let paths_block = match entry_xml.find("<paths>") {
        Some(start) => {
            let rest = &entry_xml[start..];
            match rest.find("</paths>") {
                Some(end) => &rest[..end],
                None => return Vec::new(),
            }
        }
        None => return Vec::new(),
    };
    parse_paths_block(paths_block, "<path", "</path>").unwrap_or_default()
}

fn parse_paths_block(block: &str, open_tag: &str, close_tag: &str) -> Result<Vec<ChangedPath>, SvnError> {
    let mut paths = Vec::new();
    let parts: Vec<&str> = block.split(open_tag).collect();
    for part in parts.iter().skip(1) {
        let fragment = match part.find(close_tag) {
            Some(pos) => &part[..pos],
            None => continue,
        };
        let action_code = extract_attribute_from_fragment(fragment, "action")
            .or_else(|| extract_attribute_from_fragment(fragment, "item"))
            .unwrap_or_default();
        let kind_attr = extract_attribute_from_fragment(fragment, "kind").unwrap_or_default();
        let copyfrom_path = extract_attribute_from_fragment(fragment, "copyfrom-path");
        let copyfrom_rev = extract_attribute_from_fragment(fragment, "copyfrom-rev")
            .and_then(|s| s.parse::<i64>().ok());
        let path = match fragment.find('>') {
            Some(pos) => unescape_xml(fragment[pos + 1..].trim()),
            None => String::new(),
        };
        paths.push(ChangedPath {
            path,
            action: ChangeAction::from_code(&action_code),
            kind: match kind_attr.as_str() {
                "file" => EntryKind::File,
                "dir" => EntryKind::Dir,
                _ => EntryKind::Unknown,
            },
            copyfrom_path,
            copyfrom_rev,
        });
    }
    Ok(paths)
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_svn_info() {
        let xml = r#"<info><entry kind="dir" path="." revision="1234">
<url>https://svn.example.com/repo/trunk</url>
<repository><root>https://svn.example.com/repo</root>
<uuid>a1b2c3d4</uuid></repository>
<commit revision="1234"></commit></entry></info>"#;
        let info = parse_svn_info(xml).unwrap();
        assert_eq!(info.latest_rev, 1234);
    }

    #[test]
    fn test_parse_svn_log() {
        let xml = r#"<log><logentry revision="100"><author>alice</author><date>2025-01-10T00:00:00.000000Z</date>
<paths><path action="M" kind="file">/trunk/main.rs</path></paths><msg>fix &amp; tidy</msg></logentry></log>"#;
        let entries = parse_svn_log(xml, "trunk").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rev, 100);
        assert_eq!(entries[0].message, b"fix & tidy");
        assert!(entries[0].has_changes);
    }

    #[test]
    fn test_parse_svn_log_has_changes_false_outside_root() {
        let xml = r#"<log><logentry revision="101"><author>alice</author><date></date>
<paths><path action="M" kind="file">/branches/other/file.txt</path></paths><msg></msg></logentry></log>"#;
        let entries = parse_svn_log(xml, "trunk").unwrap();
        assert!(!entries[0].has_changes);
    }

    #[test]
    fn test_parse_svn_date_empty_falls_back_to_epoch() {
        let d = parse_svn_date("");
        assert_eq!(d.timestamp(), 0);
    }
}
