//! Interactive prompt traits

use crate::types::HostSpec;

/// Answer to the per-host question in interactive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostDecision {
    /// Process the host
    Continue,
    /// Leave this host alone
    Skip,
    /// Stop the whole run
    Quit,
}

/// Questions asked on the controlling terminal
pub trait Prompter: Send + Sync {
    /// Ask whether to continue with, skip, or quit at `host`
    fn confirm_host(&self, host: &HostSpec) -> std::io::Result<HostDecision>;

    /// Ask for a password without echo; `None` or empty means give up
    fn password(&self, host: &HostSpec) -> std::io::Result<Option<String>>;
}

impl<T: Prompter + ?Sized> Prompter for std::sync::Arc<T> {
    fn confirm_host(&self, host: &HostSpec) -> std::io::Result<HostDecision> {
        (**self).confirm_host(host)
    }

    fn password(&self, host: &HostSpec) -> std::io::Result<Option<String>> {
        (**self).password(host)
    }
}
