//! Debug symbol table: bidirectional label <-> address map.
//!
//! Loaded once from an ld65/VICE label file (`al F000 .reset` per line),
//! read-only afterwards. Both directions are one-to-many: an address may
//! carry several labels and a label may appear at several addresses.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("cannot read symbol file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed symbol line {line}: {text:?}")]
    Malformed { line: usize, text: String },
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    by_address: HashMap<u16, Vec<String>>,
    by_label: HashMap<String, Vec<u16>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SymbolError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse VICE label lines: `al <hexaddr> .<label>`. Blank lines and
    /// unrelated directives are skipped.
    pub fn parse(text: &str) -> Result<Self, SymbolError> {
        let mut table = SymbolTable::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || !line.starts_with("al ") {
                continue;
            }
            let mut fields = line.split_whitespace();
            fields.next(); // "al"
            let (addr_str, label) = match (fields.next(), fields.next()) {
                (Some(a), Some(l)) => (a, l),
                _ => {
                    return Err(SymbolError::Malformed {
                        line: i + 1,
                        text: line.to_string(),
                    })
                }
            };
            let addr = u32::from_str_radix(addr_str, 16).map_err(|_| {
                SymbolError::Malformed {
                    line: i + 1,
                    text: line.to_string(),
                }
            })?;
            if addr > 0xFFFF {
                return Err(SymbolError::Malformed {
                    line: i + 1,
                    text: line.to_string(),
                });
            }
            let label = label.trim_start_matches('.').to_string();
            table.insert(addr as u16, label);
        }
        Ok(table)
    }

    pub fn insert(&mut self, addr: u16, label: String) {
        self.by_address.entry(addr).or_default().push(label.clone());
        self.by_label.entry(label).or_default().push(addr);
    }

    pub fn labels_for(&self, addr: u16) -> &[String] {
        self.by_address.get(&addr).map_or(&[], Vec::as_slice)
    }

    pub fn addresses_for(&self, label: &str) -> &[u16] {
        self.by_label.get(label).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vice_label_lines() {
        let table = SymbolTable::parse(
            "al F000 .reset\nal F31F .main\n\nbreak F000\nal F31F .start\n",
        )
        .unwrap();
        assert_eq!(table.labels_for(0xF000), ["reset"]);
        assert_eq!(table.labels_for(0xF31F), ["main", "start"]);
        assert_eq!(table.addresses_for("main"), [0xF31F]);
        assert!(table.labels_for(0x1234).is_empty());
    }

    #[test]
    fn label_at_multiple_addresses() {
        let table = SymbolTable::parse("al 1000 .loop\nal 2000 .loop\n").unwrap();
        assert_eq!(table.addresses_for("loop"), [0x1000, 0x2000]);
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(matches!(
            SymbolTable::parse("al zzzz .bad\n"),
            Err(SymbolError::Malformed { line: 1, .. })
        ));
        assert!(SymbolTable::parse("al 12345 .toobig\n").is_err());
    }
}
