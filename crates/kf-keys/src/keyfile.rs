//! In-memory authorized_keys reconciliation
//!
//! A [`KeyFile`] holds one remote account's `authorized_keys` content as an
//! ordered list of entries. Keys are matched by payload only, so applying a
//! keyfile whose comment changed replaces the stale line in place instead
//! of adding a second copy of the same key.
//!
//! Lines that are not keys (comments, blank lines, lines that fail to
//! parse) are kept byte for byte so that writing the file back never loses
//! content the reconciler does not understand. The remote file is not
//! required to be UTF-8.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{KeyFileError, KeyLineError};
use crate::keyline::{is_key_line, KeyLine};

/// Remote path used when none is configured, relative to the login directory
pub const DEFAULT_AUTHORIZED_KEYS: &str = ".ssh/authorized_keys";

/// One line of an authorized_keys file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A parsed key
    Key(KeyLine),
    /// A key on a line that is not valid UTF-8
    ///
    /// `key` comes from a lossy decoding and is only used for matching;
    /// `line` is what gets written back.
    RawKey { key: KeyLine, line: Vec<u8> },
    /// Anything else, written back untouched
    Verbatim(Vec<u8>),
}

impl Entry {
    /// Bytes written back for this entry (without line terminator)
    pub fn render(&self) -> &[u8] {
        match self {
            Entry::Key(key) => key.render().as_bytes(),
            Entry::RawKey { line, .. } => line,
            Entry::Verbatim(line) => line,
        }
    }

    fn key(&self) -> Option<&KeyLine> {
        match self {
            Entry::Key(key) | Entry::RawKey { key, .. } => Some(key),
            Entry::Verbatim(_) => None,
        }
    }

    fn has_payload(&self, payload: &str) -> bool {
        self.key().is_some_and(|key| key.payload() == payload)
    }
}

/// Effect of applying a single key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChange {
    /// Key was not present and has been appended
    Added { comment: String },
    /// Key was present with different options or comment and was replaced
    Replaced { comment: String },
    /// Identical line already present
    Unchanged { comment: String },
    /// Every line carrying the key was removed
    Removed { comment: String, count: usize },
    /// Key was asked to be removed but is not present
    Absent { comment: String },
}

impl KeyChange {
    /// Comment of the key the change refers to
    pub fn comment(&self) -> &str {
        match self {
            KeyChange::Added { comment }
            | KeyChange::Replaced { comment }
            | KeyChange::Unchanged { comment }
            | KeyChange::Removed { comment, .. }
            | KeyChange::Absent { comment } => comment,
        }
    }
}

impl fmt::Display for KeyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyChange::Added { comment } => write!(f, "Key {} added", comment),
            KeyChange::Replaced { comment } => write!(f, "Key {} replaced", comment),
            KeyChange::Unchanged { comment } => {
                write!(f, "Key {} already there, identical. Skipped", comment)
            }
            KeyChange::Removed { comment, count } if *count > 1 => {
                write!(f, "Key {} removed ({} copies)", comment, count)
            }
            KeyChange::Removed { comment, .. } => write!(f, "Key {} removed", comment),
            KeyChange::Absent { comment } => {
                write!(f, "Key {} is not there. Skipped removing it", comment)
            }
        }
    }
}

/// Outcome of applying one keyfile
///
/// Changes applied before a failure stay applied; `error` records why the
/// rest of the keyfile was not processed.
#[derive(Debug)]
pub struct Reconciliation {
    /// Keyfile path or other label the keys came from
    pub source: String,
    /// Per-key outcomes, in keyfile order
    pub changes: Vec<KeyChange>,
    /// Set when the keyfile could not be read or contained a malformed key
    pub error: Option<KeyFileError>,
}

impl Reconciliation {
    fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            changes: Vec::new(),
            error: None,
        }
    }

    fn failed(source: impl Into<String>, error: KeyFileError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(source)
        }
    }

    /// Whether the whole keyfile was applied
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Add,
    Remove,
}

/// One account's authorized_keys, held in memory for reconciliation
#[derive(Debug, Clone)]
pub struct KeyFile {
    path: String,
    entries: Vec<Entry>,
    changed: bool,
}

impl KeyFile {
    /// Empty key file for `path` (the remote file does not exist yet)
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            changed: false,
        }
    }

    /// Build from the current remote file contents
    pub fn from_contents(path: impl Into<String>, contents: &str) -> Self {
        Self::from_bytes(path, contents.as_bytes())
    }

    /// Build from the raw bytes of the remote file
    ///
    /// Line terminators (`\n` or `\r\n`) are dropped; everything else on a
    /// line that is not a key is kept as it was.
    pub fn from_bytes(path: impl Into<String>, contents: &[u8]) -> Self {
        let mut file = Self::new(path);

        for (idx, line) in split_lines(contents).into_iter().enumerate() {
            let entry = match std::str::from_utf8(line) {
                Ok(text) if is_key_line(text) => match KeyLine::parse(text) {
                    Ok(key) => Entry::Key(key),
                    Err(e) => {
                        tracing::warn!(
                            "Keeping unparseable line {} of {} as is: {}",
                            idx + 1,
                            file.path,
                            e
                        );
                        Entry::Verbatim(line.to_vec())
                    }
                },
                Ok(_) => Entry::Verbatim(line.to_vec()),
                Err(_) => {
                    let text = String::from_utf8_lossy(line);
                    match KeyLine::parse(&text) {
                        Ok(key) if is_key_line(&text) => {
                            tracing::debug!(
                                "Line {} of {} is not UTF-8, keeping its bytes",
                                idx + 1,
                                file.path
                            );
                            Entry::RawKey {
                                key,
                                line: line.to_vec(),
                            }
                        }
                        _ => Entry::Verbatim(line.to_vec()),
                    }
                }
            };
            file.entries.push(entry);
        }

        file
    }

    /// Remote path of the file
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All entries in file order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &KeyLine> + '_ {
        self.entries.iter().filter_map(Entry::key)
    }

    /// Comment of every key, in file order
    pub fn comments(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys().map(KeyLine::comment)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys().count()
    }

    /// Whether the file holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the in-memory copy differs from what was last published
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Record that the current contents have been published
    pub fn mark_committed(&mut self) {
        self.changed = false;
    }

    /// Full file contents, one entry per line, each terminated by `\n`
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.render());
            out.push(b'\n');
        }
        out
    }

    /// Add a key, replacing a stale line that carries the same payload
    pub fn add_key(&mut self, key: KeyLine) -> KeyChange {
        let comment = key.comment().to_string();

        let Some(pos) = self.entries.iter().position(|e| e.has_payload(key.payload())) else {
            tracing::info!("Key {} added", comment);
            self.entries.push(Entry::Key(key));
            self.changed = true;
            return KeyChange::Added { comment };
        };

        let change = if self.entries[pos].render() == key.render().as_bytes() {
            tracing::info!("Key {} already there, identical. Skipped adding it", comment);
            KeyChange::Unchanged { comment }
        } else {
            tracing::info!("Key {} already there with other options or comment, replacing", comment);
            self.entries[pos] = Entry::Key(key);
            self.changed = true;
            KeyChange::Replaced { comment }
        };

        self.collapse_duplicates();
        change
    }

    /// Remove every line carrying the key's payload
    pub fn remove_key(&mut self, key: &KeyLine) -> KeyChange {
        let comment = key.comment().to_string();
        let before = self.entries.len();
        self.entries.retain(|e| !e.has_payload(key.payload()));
        let count = before - self.entries.len();
        self.collapse_duplicates();

        if count == 0 {
            tracing::info!("Key {} is not there. Skipped removing it", comment);
            return KeyChange::Absent { comment };
        }

        tracing::info!("Key {} removed", comment);
        self.changed = true;
        KeyChange::Removed { comment, count }
    }

    /// Add every key in a local keyfile
    pub fn add_from_file(&mut self, path: &Path) -> Reconciliation {
        let report = self.apply_file(path, Operation::Add);
        self.collapse_duplicates();
        report
    }

    /// Remove every key in a local keyfile
    pub fn remove_from_file(&mut self, path: &Path) -> Reconciliation {
        let report = self.apply_file(path, Operation::Remove);
        self.collapse_duplicates();
        report
    }

    /// Add every key found in `text`; `source` labels log lines and errors
    pub fn add_from_str(&mut self, source: &str, text: &str) -> Reconciliation {
        let report = self.apply_text(source, text, Operation::Add);
        self.collapse_duplicates();
        report
    }

    /// Remove every key found in `text`
    pub fn remove_from_str(&mut self, source: &str, text: &str) -> Reconciliation {
        let report = self.apply_text(source, text, Operation::Remove);
        self.collapse_duplicates();
        report
    }

    fn apply_file(&mut self, path: &Path, op: Operation) -> Reconciliation {
        let source = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(text) => self.apply_text(&source, &text, op),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!("Keyfile does not exist: {}", source);
                Reconciliation::failed(source, KeyFileError::NotFound(path.to_path_buf()))
            }
            Err(e) => {
                tracing::error!("Failed to read keyfile {}: {}", source, e);
                Reconciliation::failed(
                    source,
                    KeyFileError::Read {
                        path: path.to_path_buf(),
                        source: e,
                    },
                )
            }
        }
    }

    fn apply_text(&mut self, source: &str, text: &str, op: Operation) -> Reconciliation {
        let mut report = Reconciliation::new(source);

        for (idx, line) in text.lines().enumerate() {
            if !is_key_line(line) {
                continue;
            }

            let key = match KeyLine::parse(line) {
                Ok(key) => key,
                Err(error) => {
                    report.error = Some(self.malformed(source, idx + 1, error));
                    return report;
                }
            };

            let change = match op {
                Operation::Add => self.add_key(key),
                Operation::Remove => self.remove_key(&key),
            };
            report.changes.push(change);
        }

        report
    }

    fn malformed(&self, source: &str, line: usize, error: KeyLineError) -> KeyFileError {
        tracing::error!(
            "Malformed key on line {} of {}, not applying the rest of it: {}",
            line,
            source,
            error
        );
        KeyFileError::Malformed {
            source_name: source.to_string(),
            line,
            error,
        }
    }

    /// Keep only the first line of every payload
    fn collapse_duplicates(&mut self) {
        let mut seen = HashSet::new();
        let path = &self.path;
        let before = self.entries.len();
        self.entries.retain(|e| match e.key() {
            Some(key) if !seen.insert(key.payload().to_string()) => {
                tracing::info!("Dropping duplicate line of key {} from {}", key.comment(), path);
                false
            }
            _ => true,
        });
        if self.entries.len() != before {
            self.changed = true;
        }
    }
}

/// Split on `\n`, dropping a trailing `\r` from each line
fn split_lines(contents: &[u8]) -> Vec<&[u8]> {
    if contents.is_empty() {
        return Vec::new();
    }
    let body = contents.strip_suffix(b"\n").unwrap_or(contents);
    body.split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect()
}
