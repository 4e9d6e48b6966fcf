//! `svn:externals` definition parsing.
//!
//! SVN has accumulated three external line syntaxes over its history; all
//! three must be accepted since a long-lived repository's history can
//! contain revisions written under any of them. Grounded on
//! `utils.py::parse_external_definition`.

use crate::errors::SvnError;
use crate::models::ExternalDefinition;
use crate::svn::path_utils::is_relative_external_url;

/// Parse one non-empty, non-comment line of an `svn:externals` property
/// value into an [`ExternalDefinition`].
///
/// Accepted forms (examples):
/// - modern:  `-r 42 https://example.com/repo/lib@42 vendor/lib`
/// - modern, peg on URL: `https://example.com/repo/lib@HEAD vendor/lib`
/// - legacy:  `vendor/lib -r 42 https://example.com/repo/lib`
/// - legacy, peg on URL: `vendor/lib https://example.com/repo/lib@42`
/// - quoted path with spaces: `"vendor/my lib" https://example.com/repo/lib`
pub fn parse_external_definition(line: &str) -> Result<ExternalDefinition, SvnError> {
    let tokens = tokenize(line).map_err(|detail| SvnError::InvalidExternal {
        raw: line.to_string(),
        detail,
    })?;
    if tokens.len() < 2 {
        return Err(SvnError::InvalidExternal {
            raw: line.to_string(),
            detail: "expected at least a URL and a local path".into(),
        });
    }

    let mut revision: Option<i64> = None;
    let mut rest: Vec<String> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        if tok == "-r" {
            let val = iter.next().ok_or_else(|| SvnError::InvalidExternal {
                raw: line.to_string(),
                detail: "-r flag missing a revision argument".into(),
            })?;
            revision = Some(parse_revision_token(&val, line)?);
        } else if let Some(val) = tok.strip_prefix("-r") {
            revision = Some(parse_revision_token(val, line)?);
        } else {
            rest.push(tok);
        }
    }

    if rest.len() != 2 {
        return Err(SvnError::InvalidExternal {
            raw: line.to_string(),
            detail: format!("expected exactly one URL and one path, found {}", rest.len()),
        });
    }

    let (url_tok, path_tok, legacy_format) = if looks_like_external_url(&rest[0]) {
        (rest[0].clone(), rest[1].clone(), false)
    } else if looks_like_external_url(&rest[1]) {
        (rest[1].clone(), rest[0].clone(), true)
    } else {
        return Err(SvnError::InvalidExternal {
            raw: line.to_string(),
            detail: "could not determine which token is the URL".into(),
        });
    };

    let (url, peg_revision) = split_peg_revision(&url_tok);
    let relative_url = is_relative_external_url(&url);

    Ok(ExternalDefinition {
        path: path_tok,
        url,
        revision,
        peg_revision,
        relative_url,
        legacy_format,
    })
}

/// Parse a full `svn:externals` property value (one definition per
/// non-empty, non-comment line) into all its definitions, all-or-nothing:
/// a single malformed line invalidates the whole property, matching
/// `DirEditor.change_prop`'s handling of `ValueError`.
pub fn parse_externals_property(value: &str) -> Result<Vec<ExternalDefinition>, SvnError> {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_external_definition)
        .collect()
}

fn parse_revision_token(token: &str, line: &str) -> Result<i64, SvnError> {
    token.parse::<i64>().map_err(|_| SvnError::InvalidExternal {
        raw: line.to_string(),
        detail: format!("invalid revision '{}'", token),
    })
}

fn looks_like_external_url(token: &str) -> bool {
    token.starts_with("http://")
        || token.starts_with("https://")
        || token.starts_with("svn://")
        || token.starts_with("svn+ssh://")
        || token.starts_with("file://")
        || is_relative_external_url(strip_peg(token))
}

fn strip_peg(token: &str) -> &str {
    match token.rfind('@') {
        Some(pos) if is_peg_suffix(&token[pos + 1..]) => &token[..pos],
        _ => token,
    }
}

fn is_peg_suffix(s: &str) -> bool {
    s == "HEAD" || s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty()
}

fn split_peg_revision(token: &str) -> (String, Option<i64>) {
    if let Some(pos) = token.rfind('@') {
        let suffix = &token[pos + 1..];
        if suffix == "HEAD" {
            return (token[..pos].to_string(), None);
        }
        if let Ok(rev) = suffix.parse::<i64>() {
            return (token[..pos].to_string(), Some(rev));
        }
    }
    (token.to_string(), None)
}

/// Tokenize one externals line respecting double-quoted segments and
/// backslash escapes, the way `svn`'s own externals parser does.
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    let mut current = String::new();
    let mut in_token = false;

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' if !in_token => {
                continue;
            }
            ' ' | '\t' => {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err("unterminated escape in quoted token".into()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated quoted token".into()),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err("unterminated escape".into()),
                }
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
