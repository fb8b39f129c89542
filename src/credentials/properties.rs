//! Credential file reader
//!
//! Credential files in the settings directory use the line-oriented
//! properties format: `key=value`, `key: value` or `key value`, with `#` and
//! `!` comment lines. Trailing backslashes continue a value on the next line.

use std::collections::HashMap;

/// Parsed key/value pairs of a properties file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    /// Parse properties text. Later duplicates override earlier ones.
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        let mut lines = content.lines();

        while let Some(line) = lines.next() {
            let mut logical = line.trim_start().to_string();
            if logical.is_empty() || logical.starts_with('#') || logical.starts_with('!') {
                continue;
            }

            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some(next) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical);
            if !key.is_empty() {
                entries.insert(unescape(key), unescape(value));
            }
        }

        Self { entries }
    }

    /// Value for `key`. Blank values are treated as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// First non-blank value among `keys`
    pub fn first_of(&self, keys: &[String]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries were parsed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

/// Split at the first unescaped `=`, `:` or whitespace run
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                return (line[..idx].trim_end(), line[idx + 1..].trim_start());
            }
            c if c.is_whitespace() => {
                let key = &line[..idx];
                let rest = line[idx..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (key, rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
