//! Questions on the controlling terminal

use std::io::Write;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use kf_core::{HostDecision, HostSpec, Prompter};

/// [`Prompter`] reading single keystrokes and masked passwords
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }
}

/// Leaves raw mode when dropped, also on error paths
struct RawMode;

impl RawMode {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Map one key press to an answer; `None` for keys that mean nothing
fn decision_for(key: &KeyEvent) -> Option<HostDecision> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Enter => Some(HostDecision::Continue),
        KeyCode::Char('s') | KeyCode::Char('S') => Some(HostDecision::Skip),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(HostDecision::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(HostDecision::Quit)
        }
        _ => None,
    }
}

impl Prompter for TerminalPrompter {
    fn confirm_host(&self, host: &HostSpec) -> std::io::Result<HostDecision> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}: continue (RETURN), skip this host (s), quit (q)? ", host)?;
        stdout.flush()?;

        let decision = {
            let _raw = RawMode::enable()?;
            loop {
                if let Event::Key(key) = event::read()? {
                    if let Some(decision) = decision_for(&key) {
                        break decision;
                    }
                }
            }
        };

        let answer = match decision {
            HostDecision::Continue => "continue",
            HostDecision::Skip => "skip",
            HostDecision::Quit => "quit",
        };
        writeln!(stdout, "{}", answer)?;
        Ok(decision)
    }

    fn password(&self, host: &HostSpec) -> std::io::Result<Option<String>> {
        let prompt = format!(
            "Password for {}@{} (RETURN to skip the host): ",
            host.user(),
            host.host()
        );
        let password = rpassword::prompt_password(prompt)?;
        Ok(Some(password).filter(|p| !p.is_empty()))
    }
}
