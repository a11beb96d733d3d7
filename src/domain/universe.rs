//! Instrument universe: symbol normalization and configured code lists.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

/// Canonical symbol form: trimmed, upper-case, share-class dots as dashes
/// (`brk.b` becomes `BRK-B`). Returns `None` for a blank input.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_uppercase().replace('.', "-"))
}

/// Parses a comma-separated code list, normalizing each entry.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let code = normalize_symbol(token).ok_or(UniverseError::EmptyToken)?;
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Normalizes symbols read from a data source, dropping blanks and repeats
/// while keeping first-seen order.
pub fn normalize_universe<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter_map(|s| normalize_symbol(s.as_ref()))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_symbol_replaces_dots() {
        assert_eq!(normalize_symbol(" brk.b "), Some("BRK-B".to_string()));
        assert_eq!(normalize_symbol("aapl"), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("   "), None);
    }

    #[test]
    fn parse_codes_basic() {
        let result = parse_codes("AAPL,MSFT,BRK.B").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "BRK-B"]);
    }

    #[test]
    fn parse_codes_with_whitespace() {
        let result = parse_codes("  aapl , msft ,nvda").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "NVDA"]);
    }

    #[test]
    fn parse_codes_empty_token() {
        assert_eq!(parse_codes("AAPL,,MSFT"), Err(UniverseError::EmptyToken));
        assert_eq!(parse_codes(""), Err(UniverseError::EmptyToken));
    }

    #[test]
    fn parse_codes_duplicate_after_normalizing() {
        let result = parse_codes("BRK.B,aapl,brk-b");
        assert_eq!(result, Err(UniverseError::DuplicateCode("BRK-B".into())));
    }

    #[test]
    fn normalize_universe_dedups_in_order() {
        let result = normalize_universe(["msft", "AAPL", "", "MSFT", "bf.b"]);
        assert_eq!(result, vec!["MSFT", "AAPL", "BF-B"]);
    }
}
