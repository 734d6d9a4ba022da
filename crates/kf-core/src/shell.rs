//! Quoting for commands run through the remote login shell

/// Quote `arg` for a POSIX shell
///
/// Arguments made only of characters the shell never interprets are
/// returned unchanged so log lines stay readable.
pub fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '@' | '+' | '='));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
