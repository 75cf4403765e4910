//! Source acquisition for git and local dependencies.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::DependencyError;
use super::types::{DependencyKind, DependencySpec, Revision};
use crate::process::{Invocation, run};
use crate::util::fs::{copy_dir_all, remove_dir_if_exists};

pub const ACQUIRE_ATTEMPTS: u32 = 3;
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Populate `dest` with the dependency's sources.
///
/// Network acquisition is retried with doubling backoff; a local copy fails
/// immediately.
pub async fn acquire(spec: &DependencySpec, dest: &Path, timeout: Duration) -> Result<(), DependencyError> {
  let mut backoff = INITIAL_BACKOFF;
  let mut attempt = 1;
  loop {
    match acquire_once(spec, dest, timeout).await {
      Ok(()) => return Ok(()),
      Err(e) if attempt < ACQUIRE_ATTEMPTS && spec.kind == DependencyKind::Git && e.is_retryable() => {
        warn!(name = %spec.name, attempt, error = %e, "acquisition failed, retrying");
        remove_dir_if_exists(dest).map_err(|source| DependencyError::Io {
          path: dest.to_path_buf(),
          source,
        })?;
        tokio::time::sleep(backoff).await;
        backoff *= 2;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

async fn acquire_once(spec: &DependencySpec, dest: &Path, timeout: Duration) -> Result<(), DependencyError> {
  match spec.kind {
    DependencyKind::Git => {
      let url = spec.url.clone().unwrap_or_default();
      let revision = spec.revision.clone();
      let name = spec.name.clone();
      let target = dest.to_path_buf();
      info!(name = %spec.name, url = %url, revision = ?revision, "cloning dependency");
      let interrupt = Arc::new(AtomicBool::new(false));
      let flag = Arc::clone(&interrupt);
      let clone = tokio::task::spawn_blocking(move || clone_git(&name, &url, revision.as_ref(), &target, &flag));
      match tokio::time::timeout(timeout, clone).await {
        Ok(joined) => joined.map_err(|e| acquisition(&spec.name, format!("clone task failed: {e}")))??,
        Err(_) => {
          interrupt.store(true, Ordering::Relaxed);
          return Err(acquisition(
            &spec.name,
            format!("clone timed out after {:.1}s", timeout.as_secs_f64()),
          ));
        }
      }
      if let Some(Revision::Rev(commit)) = &spec.revision {
        checkout_commit(&spec.name, dest, commit, timeout).await?;
      }
      Ok(())
    }
    DependencyKind::Local => {
      let Some(src) = spec.path.clone() else {
        return Err(acquisition(&spec.name, "no path given".to_string()));
      };
      if !src.is_dir() {
        return Err(acquisition(&spec.name, format!("{} is not a directory", src.display())));
      }
      info!(name = %spec.name, path = %src.display(), "copying local dependency");
      let target = dest.to_path_buf();
      tokio::task::spawn_blocking(move || copy_dir_all(&src, &target))
        .await
        .map_err(|e| acquisition(&spec.name, format!("copy task failed: {e}")))?
        .map_err(|e| acquisition(&spec.name, e.to_string()))
    }
    DependencyKind::System => Ok(()),
  }
}

fn acquisition(name: &str, message: String) -> DependencyError {
  DependencyError::AcquisitionFailed {
    name: name.to_string(),
    message,
  }
}

/// Clone `url` into `dest`. Tags and branches are cloned directly as the
/// checked-out reference; a raw commit is checked out afterwards.
///
/// The clone lands in a sibling staging directory and is renamed into place
/// on success, so an abandoned clone never writes into `dest`. Setting
/// `interrupt` stops the transfer at gix's next check.
fn clone_git(
  name: &str,
  url: &str,
  revision: Option<&Revision>,
  dest: &PathBuf,
  interrupt: &AtomicBool,
) -> Result<(), DependencyError> {
  let parent = dest.parent().unwrap_or(Path::new("."));
  let staging = tempfile::Builder::new()
    .prefix(".clone-")
    .tempdir_in(parent)
    .map_err(|e| acquisition(name, format!("cannot create staging directory: {e}")))?;
  let work = staging.path().join("repo");

  let mut prepared = gix::prepare_clone(url, &work).map_err(|e| acquisition(name, e.to_string()))?;

  if let Some(Revision::Tag(reference) | Revision::Branch(reference)) = revision {
    prepared = prepared
      .with_ref_name(Some(reference.as_str()))
      .map_err(|e| acquisition(name, format!("invalid reference '{reference}': {e}")))?;
  }

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, interrupt)
    .map_err(|e| acquisition(name, e.to_string()))?;

  checkout
    .main_worktree(gix::progress::Discard, interrupt)
    .map_err(|e| acquisition(name, format!("checkout failed: {e}")))?;
  drop(checkout);

  std::fs::rename(&work, dest).map_err(|e| acquisition(name, format!("cannot move clone into place: {e}")))?;

  debug!(name, path = %dest.display(), "clone complete");
  Ok(())
}

async fn checkout_commit(name: &str, repo: &Path, commit: &str, timeout: Duration) -> Result<(), DependencyError> {
  let invocation = Invocation::new("git", timeout)
    .arg("-C")
    .arg(repo)
    .args(["checkout", "--detach", commit]);
  let output = run(&invocation)
    .await
    .map_err(|e| acquisition(name, e.to_string()))?;
  if !output.success() {
    return Err(acquisition(
      name,
      format!("git checkout {commit} failed:\n{}", output.diagnostics()),
    ));
  }
  Ok(())
}
