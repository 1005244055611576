//! Virtual key codes and the symbolic key table
//!
//! Provides the `VirtualKeyCode` newtype and `VirtualKeyTable`, the
//! load-once mapping from key names (`CTRL`, `A`, `F5`) to the codes
//! delivered by the OS key event feed.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Built-in symbol table, compiled into the binary
const BUILTIN_TABLE: &str = include_str!("../../resources/vkmap.txt");

/// OS-defined numeric identifier for a physical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualKeyCode(pub u32);

impl fmt::Display for VirtualKeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Errors raised while building the key table
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("malformed key table entry on line {line}: {content:?}")]
    MalformedEntry { line: usize, content: String },

    #[error("key table contains no entries")]
    Empty,
}

/// Immutable mapping from symbolic key names to virtual key codes
#[derive(Debug, Clone)]
pub struct VirtualKeyTable {
    codes: HashMap<String, VirtualKeyCode>,
}

impl VirtualKeyTable {
    /// Build the table from the resource embedded in the binary
    pub fn builtin() -> Result<Self, ResourceError> {
        Self::from_source(BUILTIN_TABLE)
    }

    /// Build the table from `NAME = 0xHEX` lines
    ///
    /// Blank lines and `#` comments are skipped. Every other line must
    /// parse, otherwise the whole table is rejected.
    pub fn from_source(source: &str) -> Result<Self, ResourceError> {
        let mut codes = HashMap::new();

        for (idx, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, code) = parse_entry(line).ok_or_else(|| ResourceError::MalformedEntry {
                line: idx + 1,
                content: raw.to_string(),
            })?;

            codes.insert(name.to_ascii_uppercase(), code);
        }

        if codes.is_empty() {
            return Err(ResourceError::Empty);
        }

        Ok(Self { codes })
    }

    /// Resolve a key name, ignoring case and surrounding whitespace
    pub fn lookup(&self, symbol: &str) -> Option<VirtualKeyCode> {
        self.codes.get(&symbol.trim().to_ascii_uppercase()).copied()
    }

    /// Number of names in the table (aliases counted separately)
    pub fn len(&self) -> usize {
        self.codes.len()
    }
}

fn parse_entry(line: &str) -> Option<(&str, VirtualKeyCode)> {
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let hex = value
        .trim()
        .strip_prefix("0x")
        .or_else(|| value.trim().strip_prefix("0X"))?;
    let code = u32::from_str_radix(hex, 16).ok()?;

    Some((name, VirtualKeyCode(code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loads() {
        let table = VirtualKeyTable::builtin().unwrap();
        assert!(table.len() > 100);
        assert_eq!(table.lookup("A"), Some(VirtualKeyCode(0x00)));
        assert_eq!(table.lookup("CTRL"), Some(VirtualKeyCode(0x3B)));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = VirtualKeyTable::builtin().unwrap();
        assert_eq!(table.lookup("ctrl"), table.lookup("CTRL"));
        assert_eq!(table.lookup(" Shift "), table.lookup("SHIFT"));
    }

    #[test]
    fn test_aliases_share_code() {
        let table = VirtualKeyTable::builtin().unwrap();
        assert_eq!(table.lookup("DEL"), table.lookup("DELETE"));
        assert_eq!(table.lookup("ALT"), table.lookup("OPTION"));
    }

    #[test]
    fn test_unknown_symbol() {
        let table = VirtualKeyTable::builtin().unwrap();
        assert_eq!(table.lookup("BAD"), None);
        assert_eq!(table.lookup(""), None);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let table = VirtualKeyTable::from_source("# header\n\nA = 0x41\n  B=0x42  \n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("b"), Some(VirtualKeyCode(0x42)));
    }

    #[test]
    fn test_malformed_line_rejected() {
        let err = VirtualKeyTable::from_source("A = 0x41\nB = 66\n").unwrap_err();
        assert!(matches!(err, ResourceError::MalformedEntry { line: 2, .. }));
    }

    #[test]
    fn test_empty_table_rejected() {
        let err = VirtualKeyTable::from_source("# nothing here\n").unwrap_err();
        assert!(matches!(err, ResourceError::Empty));
    }

    #[test]
    fn test_display_hex() {
        assert_eq!(VirtualKeyCode(0x3B).to_string(), "0x3B");
        assert_eq!(VirtualKeyCode(0x0).to_string(), "0x00");
    }
}
