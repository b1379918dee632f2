//! Value canonicalization and case-insensitive comparison helpers.
//!
//! Two comparison regimes exist. `Plain` (the default everywhere) trims and
//! case-folds. `Semantic` first runs [`normalize`], which understands MAC,
//! IP, hostname and serial-number columns by header name.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Identity-key canonicalization: unknown columns are uppercased.
    Key,
    /// Data-value canonicalization: unknown columns keep their case.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Trim + case-insensitive ordinal comparison.
    #[default]
    Plain,
    /// Header-aware canonicalization via [`normalize`] before comparing.
    Semantic,
}

impl std::fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})\s*$").expect("static regex")
    })
}

/// Canonicalize `value` according to the semantics implied by `header`.
pub fn normalize(header: &str, value: &str, mode: NormalizeMode) -> String {
    let collapsed = whitespace_re().replace_all(value.trim(), " ");
    let value = collapsed.trim_matches(|c| c == '.' || c == '-' || c == '_');
    let header = header.trim().to_uppercase();

    if header.contains("MAC") {
        return value
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect::<String>()
            .to_ascii_uppercase();
    }

    if header.contains("IP") {
        if let Some(caps) = ipv4_re().captures(value) {
            let octets: Vec<String> = (1..=4)
                .map(|i| {
                    let digits = &caps[i];
                    digits
                        .parse::<u32>()
                        .map(|n| n.to_string())
                        .unwrap_or_else(|_| digits.to_string())
                })
                .collect();
            return octets.join(".");
        }
        return value.to_string();
    }

    if header.contains("HOST") || header.contains("NAME") {
        return value.chars().map(simple_lower).collect();
    }

    if header.contains("SERIAL")
        || header.contains("S\\N")
        || header.contains("ASSET TAG")
        || header.contains("ASSET_TAG")
    {
        let compact = value
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>();
        return fold(&compact);
    }

    match mode {
        NormalizeMode::Key => fold(value),
        NormalizeMode::Value => value.to_string(),
    }
}

/// Case-fold for ordinal-ignore-case comparison and ordering.
///
/// One char in, one char out: characters whose uppercase form expands
/// (`ß` → `SS`) are kept as they are.
pub fn fold(s: &str) -> String {
    s.chars().map(simple_upper).collect()
}

fn simple_upper(c: char) -> char {
    let mut up = c.to_uppercase();
    match (up.next(), up.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

fn simple_lower(c: char) -> char {
    let mut low = c.to_lowercase();
    match (low.next(), low.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || fold(a) == fold(b)
}

/// Folded comparison form of a cell under the given mode.
///
/// Two cells agree iff their canonical forms are equal; a cell is blank iff
/// its canonical form is empty.
pub fn canonical(mode: ComparisonMode, header: &str, value: &str) -> String {
    match mode {
        ComparisonMode::Plain => fold(value.trim()),
        ComparisonMode::Semantic => fold(&normalize(header, value, NormalizeMode::Value)),
    }
}

/// Canonical form used to identify a record by its key column.
pub fn canonical_key(mode: ComparisonMode, key_column: &str, raw: &str) -> String {
    match mode {
        ComparisonMode::Plain => raw.trim().to_string(),
        ComparisonMode::Semantic => normalize(key_column, raw, NormalizeMode::Key),
    }
}
