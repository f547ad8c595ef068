//! Parsing of the `out_links` / `anchor_texts` corpus columns.
//!
//! The crawler wrote these columns as stringified Python lists, but older
//! crawl files hold free text with embedded URLs or placeholder values such
//! as `1`. Parsing tries a structured list first (JSON array or Python list
//! literal), then falls back to extracting `http(s)://` tokens.

use std::sync::OnceLock;

use regex::Regex;

/// Outcome of parsing one `out_links` cell.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkField {
    /// Empty cell, empty list or a known placeholder.
    NoLinks,
    /// Links recovered from a structured list or from embedded URLs.
    Parsed(Vec<String>),
    /// Non-empty text with no recoverable links.
    Unparseable(String),
}

impl LinkField {
    /// The links to use for graph construction; `Unparseable` yields none.
    pub fn into_links(self) -> Vec<String> {
        match self {
            LinkField::Parsed(links) => links,
            LinkField::NoLinks | LinkField::Unparseable(_) => Vec::new(),
        }
    }
}

const SENTINELS: &[&str] = &["", "1", "0", "[]", "nan", "none", "null"];

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"https?://[^\s'",\[\]()]+"#).expect("valid URL regex"))
}

fn is_sentinel(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    SENTINELS.contains(&lowered.as_str())
}

/// Parse an `out_links` cell.
pub fn parse_out_links(raw: Option<&str>) -> LinkField {
    let raw = match raw {
        Some(r) if !is_sentinel(r) => r.trim(),
        _ => return LinkField::NoLinks,
    };

    if let Some(items) = parse_list_literal(raw) {
        let links: Vec<String> = items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return if links.is_empty() {
            LinkField::NoLinks
        } else {
            LinkField::Parsed(links)
        };
    }

    let extracted: Vec<String> = url_pattern()
        .find_iter(raw)
        .map(|m| m.as_str().to_string())
        .collect();
    if extracted.is_empty() {
        LinkField::Unparseable(raw.to_string())
    } else {
        LinkField::Parsed(extracted)
    }
}

/// Parse an `anchor_texts` cell and align it with `link_count` links.
///
/// Anchors that cannot be parsed as a list become empty strings; extra
/// anchors are dropped.
pub fn parse_anchor_texts(raw: Option<&str>, link_count: usize) -> Vec<String> {
    let mut anchors = raw
        .filter(|r| !is_sentinel(r))
        .and_then(|r| parse_list_literal(r.trim()))
        .unwrap_or_default();
    anchors.resize(link_count, String::new());
    anchors
}

/// Parse a JSON array of strings or a Python list literal of strings.
///
/// Returns `None` unless the whole input is a well-formed list.
pub fn parse_list_literal(raw: &str) -> Option<Vec<String>> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
        return Some(items);
    }
    PyListParser::new(raw).parse()
}

/// Minimal reader for `['a', "b", 'c\'d']` style list literals.
struct PyListParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> PyListParser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            chars: raw.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse(mut self) -> Option<Vec<String>> {
        self.skip_ws();
        if self.chars.next()? != '[' {
            return None;
        }
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.chars.peek()? {
                ']' => {
                    self.chars.next();
                    break;
                }
                '\'' | '"' => items.push(self.string()?),
                _ => return None,
            }
            self.skip_ws();
            match self.chars.next()? {
                ',' => continue,
                ']' => break,
                _ => return None,
            }
        }
        self.skip_ws();
        if self.chars.next().is_some() {
            return None;
        }
        Some(items)
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.chars.next()?;
        let mut out = String::new();
        loop {
            match self.chars.next()? {
                '\\' => match self.chars.next()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    other => out.push(other),
                },
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }
}
