//! Actions run on every host

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Names accepted on the command line, in help order
pub const ACTION_NAMES: &[&str] = &[
    "list", "add", "remove", "addremove", "hostname", "ssh", "cmd", "script", "scp",
];

/// What to do on each host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Show the authorized keys
    List,
    /// Add every keyfile of the list
    Add,
    /// Remove every keyfile of the list
    Remove,
    /// Add or remove according to each entry's `+`/`-` marker
    AddRemove,
    /// Print the remote host name
    Hostname,
    /// Interactive login
    Ssh,
    /// Run a command
    Cmd(String),
    /// Upload and run a local shell script
    Script(PathBuf),
    /// Upload a local file to the login directory
    Scp(PathBuf),
}

/// Invalid action on the command line
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ActionError {
    #[error("Unknown action {0:?} (expected one of: {})", ACTION_NAMES.join(", "))]
    Unknown(String),

    #[error("Action {0} needs an argument")]
    MissingArgument(&'static str),

    #[error("Action {0} takes no arguments")]
    UnexpectedArgument(&'static str),
}

impl Action {
    /// Build an action from its name and the remaining arguments
    pub fn parse(name: &str, args: &[String]) -> Result<Self, ActionError> {
        let no_args = |action: Action| {
            if args.is_empty() {
                Ok(action)
            } else {
                Err(ActionError::UnexpectedArgument(action.name()))
            }
        };

        match name {
            "list" => no_args(Action::List),
            "add" => no_args(Action::Add),
            "remove" => no_args(Action::Remove),
            "addremove" => no_args(Action::AddRemove),
            "hostname" => no_args(Action::Hostname),
            "ssh" => no_args(Action::Ssh),
            "cmd" => {
                if args.is_empty() {
                    return Err(ActionError::MissingArgument("cmd"));
                }
                Ok(Action::Cmd(args.join(" ")))
            }
            "script" | "scp" => {
                let action_name = if name == "script" { "script" } else { "scp" };
                let [path] = args else {
                    return Err(if args.is_empty() {
                        ActionError::MissingArgument(action_name)
                    } else {
                        ActionError::UnexpectedArgument(action_name)
                    });
                };
                let path = PathBuf::from(path);
                Ok(if name == "script" {
                    Action::Script(path)
                } else {
                    Action::Scp(path)
                })
            }
            other => Err(ActionError::Unknown(other.to_string())),
        }
    }

    /// Name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Add => "add",
            Action::Remove => "remove",
            Action::AddRemove => "addremove",
            Action::Hostname => "hostname",
            Action::Ssh => "ssh",
            Action::Cmd(_) => "cmd",
            Action::Script(_) => "script",
            Action::Scp(_) => "scp",
        }
    }

    /// Whether the action needs a keyfile or keyfile list
    pub fn needs_keys(&self) -> bool {
        matches!(self, Action::Add | Action::Remove | Action::AddRemove)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Cmd(command) => write!(f, "cmd {}", command),
            Action::Script(path) | Action::Scp(path) => write!(f, "{} {}", self.name(), path.display()),
            _ => f.write_str(self.name()),
        }
    }
}
