//! Publishing a reconciled authorized_keys file
//!
//! The live file is never written in place. A commit goes through these
//! stages, strictly in order:
//!
//! 1. **Backup**: `test -f <backup> || cp -p <auth> <backup>` keeps the
//!    first version of the day as `<auth>-YYYY-MM-DD.bak`. Best effort.
//! 2. **Stage**: create the parent directory (mode 700) if missing and
//!    write the rendered file to `<auth>-new` over SFTP.
//! 3. **Verify**: the staged file must exist and be at least as large as
//!    what was written.
//! 4. **Activate**: `mv -f <auth>-new <auth>`.
//!
//! A failure in stages 2-4 leaves the live file untouched and the key file
//! marked as changed.

use std::fmt;

use chrono::NaiveDate;
use kf_keys::KeyFile;

use crate::error::CommitError;
use crate::shell::quote;
use crate::traits::RemoteSession;

/// Stage of the commit protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    Backup,
    Stage,
    Verify,
    Activate,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommitStage::Backup => "backing up",
            CommitStage::Stage => "staging",
            CommitStage::Verify => "verifying",
            CommitStage::Activate => "activating",
        };
        f.write_str(s)
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing changed, nothing was sent
    Unchanged,
    /// New file is live
    Activated { bytes: u64, backup: String },
}

/// Same-day backup location for `auth_path`
pub fn backup_path(auth_path: &str, date: NaiveDate) -> String {
    format!("{}-{}.bak", auth_path, date.format("%Y-%m-%d"))
}

/// Where the new file is written before activation
pub fn staged_path(auth_path: &str) -> String {
    format!("{}-new", auth_path)
}

/// Publish `file` through `session`, dating the backup with today's local date
pub async fn commit<S>(file: &mut KeyFile, session: &S) -> Result<CommitOutcome, CommitError>
where
    S: RemoteSession + ?Sized,
{
    commit_dated(file, session, chrono::Local::now().date_naive()).await
}

/// Publish `file` through `session` using `date` for the backup name
pub async fn commit_dated<S>(
    file: &mut KeyFile,
    session: &S,
    date: NaiveDate,
) -> Result<CommitOutcome, CommitError>
where
    S: RemoteSession + ?Sized,
{
    if !file.is_changed() {
        tracing::debug!("{} unchanged on {}, nothing to commit", file.path(), session.host());
        return Ok(CommitOutcome::Unchanged);
    }

    let auth = file.path().to_string();
    let backup = backup_path(&auth, date);
    let staged = staged_path(&auth);

    // Backup
    let cmd = format!(
        "test -f {backup} || cp -p {auth} {backup}",
        backup = quote(&backup),
        auth = quote(&auth)
    );
    match session.exec(&cmd).await {
        Ok(out) if out.success() => tracing::info!("Backup of {} is {}", auth, backup),
        Ok(out) => tracing::warn!(
            "Backup of {} failed (exit status {}): {}",
            auth,
            out.exit_status,
            out.stderr_string().trim()
        ),
        Err(e) => tracing::warn!("Backup of {} failed: {}", auth, e),
    }

    // Stage
    if let Some(dir) = parent_dir(&auth) {
        let cmd = format!("test -d {dir} || mkdir -p -m 700 {dir}", dir = quote(dir));
        let out = session.exec(&cmd).await.map_err(|source| CommitError::Transfer {
            stage: CommitStage::Stage,
            source,
        })?;
        if !out.success() {
            tracing::warn!("Could not create {}: {}", dir, out.stderr_string().trim());
        }
    }

    let contents = file.render();
    let wanted = contents.len() as u64;
    session
        .write_file(&staged, &contents)
        .await
        .map_err(|source| CommitError::Transfer {
            stage: CommitStage::Stage,
            source,
        })?;
    tracing::info!("Staged {} bytes to {}", wanted, staged);

    // Verify
    let actual = session
        .file_size(&staged)
        .await
        .map_err(|source| CommitError::Transfer {
            stage: CommitStage::Verify,
            source,
        })?;
    match actual {
        Some(size) if size >= wanted => tracing::debug!("{} verified at {} bytes", staged, size),
        _ => {
            tracing::error!("Verification of {} failed, keeping {} as it is", staged, auth);
            return Err(CommitError::Verification {
                path: staged,
                expected: wanted,
                actual,
            });
        }
    }

    // Activate
    let cmd = format!("mv -f {} {}", quote(&staged), quote(&auth));
    let out = session.exec(&cmd).await.map_err(|source| CommitError::Transfer {
        stage: CommitStage::Activate,
        source,
    })?;
    if !out.success() {
        return Err(CommitError::Activation {
            path: auth,
            status: out.exit_status,
            stderr: out.stderr_string().trim().to_string(),
        });
    }

    tracing::info!("{} activated on {}", auth, session.host());
    file.mark_committed();
    Ok(CommitOutcome::Activated {
        bytes: wanted,
        backup,
    })
}

fn parent_dir(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => Some(dir),
        _ => None,
    }
}
