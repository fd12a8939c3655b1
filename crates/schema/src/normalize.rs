//! Text normalization shared by header inference and product matching.

/// Split raw text into lowercase alphanumeric tokens.
///
/// Boundaries are any non-alphanumeric character and a lowercase-or-digit to
/// uppercase transition (`ItemName` → `item`, `name`). Runs of capitals stay
/// together (`SKU`, `ID`).
pub fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in raw.chars() {
        if !c.is_alphanumeric() {
            flush(&mut tokens, &mut current);
            prev = None;
            continue;
        }

        let camel_boundary = c.is_uppercase()
            && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
        if camel_boundary {
            flush(&mut tokens, &mut current);
        }

        current.extend(c.to_lowercase());
        prev = Some(c);
    }
    flush(&mut tokens, &mut current);

    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// Case/whitespace/punctuation-insensitive form of free text: lowercase
/// tokens joined by single spaces.
///
/// Unlike [`tokenize`] this does not split camelCase, so product names such as
/// "iPhone" keep their shape.
pub fn normalize_text(raw: &str) -> String {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A header (or synonym) in comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderKey {
    /// Tokens concatenated without separators (`"Unit Price"` → `"unitprice"`).
    pub compact: String,
    pub tokens: Vec<String>,
}

impl HeaderKey {
    pub fn new(raw: &str) -> Self {
        let tokens = tokenize(raw);
        Self {
            compact: tokens.concat(),
            tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Exact normalized equality.
    pub fn matches_exactly(&self, other: &HeaderKey) -> bool {
        !self.is_empty() && self.compact == other.compact
    }

    /// True when `other`'s tokens appear as a contiguous run inside `self`.
    pub fn contains_run(&self, other: &HeaderKey) -> bool {
        if other.is_empty() || other.tokens.len() > self.tokens.len() {
            return false;
        }
        self.tokens
            .windows(other.tokens.len())
            .any(|window| window == other.tokens.as_slice())
    }
}
