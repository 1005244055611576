//! Key binding values and the `KEY+KEY+...` expression parser

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::keys::{VirtualKeyCode, VirtualKeyTable};

/// A set of keys that must be held together, plus the command it fires
///
/// Keys are kept in a sorted set, so token order and duplicates in the
/// source expression do not affect equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KeyBinding {
    keys: BTreeSet<VirtualKeyCode>,
    command: String,
}

impl KeyBinding {
    /// Create a binding from already-resolved keys
    #[cfg(test)]
    pub fn new(keys: impl IntoIterator<Item = VirtualKeyCode>, command: impl Into<String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            command: command.into(),
        }
    }

    /// The keys that must all be pressed
    pub fn keys(&self) -> &BTreeSet<VirtualKeyCode> {
        &self.keys
    }

    /// Command string handed downstream on activation
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.keys.iter().map(ToString::to_string).collect();
        write!(f, "{} -> {}", keys.join("+"), self.command)
    }
}

/// A binding expression that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("binding <{expression}> contains invalid or unknown key {token:?}")]
pub struct InvalidBindingError {
    /// The original expression as configured
    pub expression: String,
    /// The token that failed to resolve
    pub token: String,
}

/// Turns configured expressions into `KeyBinding`s
#[derive(Debug, Clone, Copy)]
pub struct BindingParser<'a> {
    table: &'a VirtualKeyTable,
}

impl<'a> BindingParser<'a> {
    pub fn new(table: &'a VirtualKeyTable) -> Self {
        Self { table }
    }

    /// Parse `expression` into a binding for `command`
    ///
    /// Returns `Ok(None)` when either side is blank; such entries are
    /// skipped rather than reported. A single unresolved token rejects the
    /// whole expression.
    pub fn parse(
        &self,
        expression: &str,
        command: &str,
    ) -> Result<Option<KeyBinding>, InvalidBindingError> {
        if expression.trim().is_empty() || command.trim().is_empty() {
            return Ok(None);
        }

        let mut keys = BTreeSet::new();
        for token in expression.split('+').map(str::trim) {
            let code = self
                .table
                .lookup(token)
                .ok_or_else(|| InvalidBindingError {
                    expression: expression.to_string(),
                    token: token.to_string(),
                })?;
            keys.insert(code);
        }

        Ok(Some(KeyBinding {
            keys,
            command: command.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> VirtualKeyTable {
        VirtualKeyTable::builtin().unwrap()
    }

    #[test]
    fn test_parse_simple() {
        let table = table();
        let parser = BindingParser::new(&table);
        let binding = parser.parse("CTRL+SHIFT+P", "play:applause").unwrap().unwrap();

        assert_eq!(binding.command(), "play:applause");
        assert_eq!(binding.keys().len(), 3);
        assert!(binding.keys().contains(&table.lookup("P").unwrap()));
    }

    #[test]
    fn test_token_order_irrelevant() {
        let table = table();
        let parser = BindingParser::new(&table);
        let a = parser.parse("CTRL+ALT+DEL", "x").unwrap().unwrap();
        let b = parser.parse("DEL+ALT+CTRL", "x").unwrap().unwrap();
        assert_eq!(a.keys(), b.keys());
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_tokens_collapse() {
        let table = table();
        let parser = BindingParser::new(&table);
        let a = parser.parse("CTRL+CTRL+A", "x").unwrap().unwrap();
        let b = parser.parse("CTRL+A", "x").unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.keys().len(), 2);
    }

    #[test]
    fn test_whitespace_and_case() {
        let table = table();
        let parser = BindingParser::new(&table);
        let a = parser.parse("  ctrl +  a ", "x").unwrap().unwrap();
        let b = parser.parse("CTRL+A", "x").unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_blank_entries_skipped() {
        let table = table();
        let parser = BindingParser::new(&table);
        assert_eq!(parser.parse("", "mute").unwrap(), None);
        assert_eq!(parser.parse("   ", "mute").unwrap(), None);
        assert_eq!(parser.parse("ALT+M", "").unwrap(), None);
        assert_eq!(parser.parse("ALT+M", " \t").unwrap(), None);
    }

    #[test]
    fn test_unknown_token_rejects_expression() {
        let table = table();
        let parser = BindingParser::new(&table);
        let err = parser.parse("BAD+Z", "y").unwrap_err();
        assert_eq!(err.token, "BAD");
        assert_eq!(err.expression, "BAD+Z");
        assert!(err.to_string().contains("BAD+Z"));
    }

    #[test]
    fn test_empty_token_rejects_expression() {
        let table = table();
        let parser = BindingParser::new(&table);
        let err = parser.parse("CTRL++A", "y").unwrap_err();
        assert_eq!(err.token, "");
    }

    #[test]
    fn test_same_keys_different_commands_are_distinct() {
        let table = table();
        let parser = BindingParser::new(&table);
        let a = parser.parse("ALT+M", "mute").unwrap().unwrap();
        let b = parser.parse("ALT+M", "unmute").unwrap().unwrap();
        assert_eq!(a.keys(), b.keys());
        assert_ne!(a, b);
    }
}
