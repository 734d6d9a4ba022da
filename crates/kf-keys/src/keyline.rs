//! Single authorized_keys line parsing
//!
//! A line has the OpenSSH shape
//! `[options] <algorithm> <base64-payload> [comment]`. The options field
//! may contain double-quoted sections with embedded whitespace, e.g.
//! `command="echo hi",no-pty ssh-ed25519 AAAA... deploy@ci`.

use std::fmt;

use crate::error::KeyLineError;

/// Algorithm prefixes recognised as the start of a key
const ALGORITHM_PREFIXES: &[&str] = &["ssh-", "ecdsa-sha2-", "sk-ssh-", "sk-ecdsa-sha2-"];

/// Substrings used by the cheap pre-check in [`is_key_line`]
const KEY_MARKERS: &[&str] = &["ssh-", "ecdsa-sha2-"];

/// A parsed authorized_keys entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLine {
    raw: String,
    options: Option<String>,
    algorithm: String,
    payload: String,
    remainder: String,
}

impl KeyLine {
    /// Parse one line; surrounding whitespace and the line terminator are ignored
    pub fn parse(line: &str) -> Result<Self, KeyLineError> {
        let raw = line.trim();

        let (options, rest) = if starts_with_algorithm(raw) {
            (None, raw)
        } else {
            let end = options_end(raw)?;
            (Some(raw[..end].to_string()), &raw[end..])
        };

        let (algorithm, rest) = split_token(rest);
        if !starts_with_algorithm(algorithm) {
            return Err(KeyLineError::MissingAlgorithm);
        }

        let (payload, remainder) = split_token(rest);
        if payload.is_empty() {
            return Err(KeyLineError::MissingPayload {
                algorithm: algorithm.to_string(),
            });
        }
        if let Some(found) = payload.chars().find(|c| !is_base64_char(*c)) {
            return Err(KeyLineError::InvalidPayload { found });
        }

        Ok(Self {
            raw: raw.to_string(),
            options,
            algorithm: algorithm.to_string(),
            payload: payload.to_string(),
            remainder: remainder.trim().to_string(),
        })
    }

    /// Key algorithm, e.g. `ssh-ed25519`
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Base64 key material; the identity of the key
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Options field preceding the algorithm, if any
    pub fn options(&self) -> Option<&str> {
        self.options.as_deref()
    }

    /// Everything after the payload (usually the comment)
    pub fn comment(&self) -> &str {
        &self.remainder
    }

    /// The line as it is written back to the remote file
    pub fn render(&self) -> &str {
        &self.raw
    }

    /// Whether both lines carry the same key material
    pub fn same_key(&self, other: &KeyLine) -> bool {
        self.payload == other.payload
    }

    /// OpenSSH style `SHA256:` fingerprint, if the payload decodes as a public key
    pub fn fingerprint(&self) -> Option<String> {
        russh_keys::parse_public_key_base64(&self.payload)
            .ok()
            .map(|key| format!("SHA256:{}", key.fingerprint()))
    }
}

impl fmt::Display for KeyLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Cheap check whether a line should be handed to [`KeyLine::parse`]
///
/// Blank lines and `#` comments are never key lines, even when the
/// comment mentions a key.
pub fn is_key_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return false;
    }
    KEY_MARKERS.iter().any(|marker| trimmed.contains(marker))
}

fn starts_with_algorithm(token: &str) -> bool {
    ALGORITHM_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix) && token.len() > prefix.len())
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

/// Split off the first whitespace-delimited token
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

/// Byte offset where the options field ends (first unquoted whitespace)
fn options_end(s: &str) -> Result<usize, KeyLineError> {
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => return Ok(i),
            _ => {}
        }
    }

    if in_quotes {
        Err(KeyLineError::UnterminatedQuote)
    } else {
        Ok(s.len())
    }
}
