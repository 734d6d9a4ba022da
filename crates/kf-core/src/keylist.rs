//! Keyfile lists
//!
//! A keyfile list names the local public-key files to apply, one per line.
//! A leading `+` or `-` marks a file for addition or removal when the
//! `addremove` action is used:
//!
//! ```text
//! # team keys
//! alice.pub
//! +bob.pub
//! -mallory.pub
//! /etc/keyfleet/ci.pub
//! ```
//!
//! Relative paths are resolved against the directory of the list itself.

use std::path::{Path, PathBuf};

use crate::error::ParseError;

/// What `addremove` does with a keyfile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIntent {
    Add,
    Remove,
}

/// One keyfile named by a keyfile list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyListEntry {
    pub path: PathBuf,
    pub intent: KeyIntent,
}

/// Ordered list of keyfiles to apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyList {
    entries: Vec<KeyListEntry>,
}

impl KeyList {
    /// A list holding a single keyfile marked for addition
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: vec![KeyListEntry {
                path: path.into(),
                intent: KeyIntent::Add,
            }],
        }
    }

    /// Parse list text; relative paths are joined onto `base`
    pub fn parse(text: &str, base: &Path) -> Result<Self, ParseError> {
        let mut entries = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = match line.find('#') {
                Some(i) => &line[..i],
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let (intent, name) = match line.as_bytes()[0] {
                b'+' => (KeyIntent::Add, line[1..].trim_start()),
                b'-' => (KeyIntent::Remove, line[1..].trim_start()),
                _ => (KeyIntent::Add, line),
            };
            if name.is_empty() {
                return Err(ParseError::Syntax {
                    line: idx + 1,
                    message: "marker without a keyfile path".to_string(),
                });
            }

            entries.push(KeyListEntry {
                path: base.join(name),
                intent,
            });
        }

        Ok(Self { entries })
    }

    /// Read and parse a keyfile list
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&text, base)
    }

    pub fn entries(&self) -> &[KeyListEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
