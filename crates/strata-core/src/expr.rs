//! Helpers for opaque SQL expressions (defaults, checks, predicates).
//!
//! Expressions are never parsed; they are normalized for comparison and
//! scanned for identifiers so the planner can order changes around them.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"|`([^`]+)`|'(?:[^']|'')*'|([A-Za-z_][A-Za-z0-9_$]*)"#)
        .expect("identifier pattern is a valid regex")
});

/// Normalizes an expression for equality checks.
///
/// Collapses whitespace, strips redundant outer parentheses and lowercases
/// everything outside string literals.
#[must_use]
pub fn normalize(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut in_literal = false;
    let mut pending_space = false;

    for ch in expr.trim().chars() {
        if in_literal {
            out.push(ch);
            if ch == '\'' {
                in_literal = false;
            }
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        if ch == '\'' {
            in_literal = true;
        }
        out.push(ch.to_ascii_lowercase());
    }

    let mut trimmed = out.as_str();
    while trimmed.starts_with('(') && trimmed.ends_with(')') && wraps_whole(trimmed) {
        trimmed = trimmed[1..trimmed.len() - 1].trim();
    }
    trimmed.to_string()
}

/// Returns true if the first character's matching paren is the last character.
fn wraps_whole(expr: &str) -> bool {
    let mut depth = 0usize;
    let last = expr.len() - 1;
    for (i, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == last;
                }
            }
            _ => {}
        }
    }
    false
}

/// Compares two optional expressions after normalization.
#[must_use]
pub fn same(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => normalize(a) == normalize(b),
        _ => false,
    }
}

/// Collects the identifiers an expression mentions, lowercased.
///
/// Quoted identifiers keep their inner text; string literals are skipped.
#[must_use]
pub fn identifiers(expr: &str) -> BTreeSet<String> {
    IDENT_RE
        .captures_iter(expr)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

/// Returns true if the expression mentions `name` as an identifier.
#[must_use]
pub fn mentions(expr: &str, name: &str) -> bool {
    identifiers(expr).contains(&name.to_ascii_lowercase())
}

/// Returns true if `name` appears as a whole word anywhere, string literals
/// included. Sequence references such as `nextval('seq')` live in literals.
#[must_use]
pub fn contains_word(expr: &str, name: &str) -> bool {
    let haystack = expr.to_ascii_lowercase();
    let needle = name.to_ascii_lowercase();
    if needle.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    haystack.match_indices(&needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}
