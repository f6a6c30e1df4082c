//! Run lock: one rewrite per repository at a time

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "run.lock";

/// Exclusive lock held for the duration of `scrub run`
pub struct RunLock {
    path: PathBuf,
    // Holds the flock until drop
    #[allow(dead_code)]
    file: File,
}

/// What the holder writes into the lock file
#[derive(Debug, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl RunLock {
    /// Take the lock in `scrub_dir`
    ///
    /// Fails if another live process holds it. A lock left behind by a dead
    /// process is removed and taken over.
    pub fn acquire(scrub_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(scrub_dir)
            .with_context(|| format!("failed to create {}", scrub_dir.display()))?;
        let lock_path = scrub_dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .context("failed to open run lock")?;

        if !try_flock_exclusive(&file)? {
            match read_owner(&mut file) {
                Ok(owner) if is_process_alive(owner.pid) => {
                    anyhow::bail!(
                        "another scrub run (pid {}) is rewriting this repository",
                        owner.pid
                    );
                }
                _ => {
                    tracing::warn!(path = %lock_path.display(), "removing stale run lock");
                    drop(file);
                    std::fs::remove_file(&lock_path)?;
                    return Self::acquire(scrub_dir);
                }
            }
        }

        write_owner(&mut file)?;
        Ok(Self {
            path: lock_path,
            file,
        })
    }

    /// Owner of a live lock in `scrub_dir`, if any
    pub fn holder(scrub_dir: &Path) -> Option<LockOwner> {
        let mut file = File::open(scrub_dir.join(LOCK_FILE)).ok()?;
        let owner = read_owner(&mut file).ok()?;
        (owner.pid != std::process::id() && is_process_alive(owner.pid)).then_some(owner)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn write_owner(file: &mut File) -> Result<()> {
    let owner = LockOwner {
        pid: std::process::id(),
        started_at: chrono::Utc::now(),
    };
    let serialized = serde_json::to_string(&owner).context("failed to serialize lock owner")?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn read_owner(file: &mut File) -> Result<LockOwner> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).context("failed to parse lock owner")
}

/// Try to take an exclusive flock without blocking
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

/// Null signal: checks existence without delivering anything
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        // EPERM: exists but belongs to someone else
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
