// Run lock: one processing pass per catalog at a time

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use crate::constants::LOCK_FILENAME;
use crate::db::get_app_path;
use crate::db::models::now_rfc3339;
use crate::error::{BrollError, Result};

/// Held for the duration of a pass; the lock file is removed on drop.
///
/// A lock left behind by a run that was killed is taken over when it was
/// written on this host by a process that no longer exists.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    token: String,
}

impl RunLock {
    pub fn acquire(drive_root: &Path) -> Result<Self> {
        let path = get_app_path(drive_root).join(LOCK_FILENAME);
        let token = Uuid::new_v4().to_string();

        match try_create(&path, &token) {
            Ok(()) => {
                log::debug!("Acquired run lock {}", path.display());
                Ok(RunLock { path, token })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.lines().next().map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());

                if is_stale(&holder) {
                    log::warn!("Removing stale run lock {} left by {}", path.display(), holder);
                    fs::remove_file(&path)?;
                    try_create(&path, &token).map_err(|e| match e.kind() {
                        ErrorKind::AlreadyExists => locked(&path, "another run"),
                        _ => e.into(),
                    })?;
                    return Ok(RunLock { path, token });
                }

                Err(locked(&path, &holder))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Only remove the file if it is still ours
        let ours = fs::read_to_string(&self.path)
            .map(|s| s.lines().nth(1) == Some(self.token.as_str()))
            .unwrap_or(false);
        if ours {
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("Failed to remove run lock {}: {}", self.path.display(), e);
            }
        }
    }
}

fn try_create(path: &Path, token: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = writeln!(file, "{}\n{}\n{}", get_owner_id(), token, now_rfc3339()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn locked(path: &Path, holder: &str) -> BrollError {
    BrollError::RunLocked(format!(
        "{} (held by {}; delete the file if that process is gone)",
        path.display(),
        holder
    ))
}

fn get_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn get_owner_id() -> String {
    format!("{}:{}", get_hostname(), std::process::id())
}

/// A holder is stale only when it ran on this host and its pid is gone.
/// Locks from other machines sharing the drive are never broken.
fn is_stale(holder: &str) -> bool {
    let Some((host, pid)) = holder.rsplit_once(':') else {
        return false;
    };
    let Ok(pid) = pid.trim().parse::<u32>() else {
        return false;
    };
    host == get_hostname() && pid != std::process::id() && !is_pid_alive(pid)
}

fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 checks existence without delivering anything
        let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
        ret == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}
