use anyhow::{bail, ensure, Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, error, info};

use crate::types::RepoSnapshot;

/// Name of the long-lived branch whose unique commits count as patch work.
pub const PATCH_BRANCH: &str = "patch";

/// Read-only queries against a source-control repository.
///
/// Every method is side-effect-free on repository content. A ref that does
/// not exist is not an error: it resolves to the documented default (zero
/// count, `false`, `"N/A"`, `"dev"`). `Err` is reserved for the query
/// mechanism itself being unavailable.
pub trait RepoQuery {
    fn tag_count(&self) -> Result<u32>;

    /// Commits reachable from `refname`; 0 when the ref does not exist.
    fn commit_count(&self, refname: &str) -> Result<u32>;

    fn has_uncommitted_changes(&self) -> Result<bool>;

    fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Commit hash of the most recent tag reachable by any ref.
    fn latest_tag_commit(&self) -> Result<Option<String>>;

    fn latest_tag_name(&self) -> Result<String>;

    fn current_branch(&self) -> Result<String>;

    fn short_head_commit(&self) -> Result<String>;

    fn head_commit_epoch(&self) -> Result<Option<i64>>;

    /// Commits in `from..to`, or all commits reachable from `to` when
    /// `from` is absent (fresh repository without tags).
    fn commits_between(&self, from: Option<&str>, to: &str) -> Result<u32>;
}

/// Build a snapshot by issuing the queries in sequence. Later queries may
/// depend on branch state established before this is called, so nothing
/// here runs concurrently.
pub fn snapshot(repo: &dyn RepoQuery) -> Result<RepoSnapshot> {
    let tag_commit = repo.latest_tag_commit()?;
    let commits_since_tag = repo.commits_between(tag_commit.as_deref(), "HEAD")?;

    let snap = RepoSnapshot {
        tag_commit,
        latest_tag: repo.latest_tag_name()?,
        branch: repo.current_branch()?,
        commit: repo.short_head_commit()?,
        commit_epoch: repo.head_commit_epoch()?,
        tag_count: repo.tag_count()?,
        commits_since_tag,
        dirty: repo.has_uncommitted_changes()?,
        patch_branch_exists: repo.branch_exists(PATCH_BRANCH)?,
        patch_branch_commits: repo.commit_count(PATCH_BRANCH)?,
    };

    debug!(
        "Snapshot: {} tags, {} commits since tag, dirty: {}, patch branch: {}",
        snap.tag_count, snap.commits_since_tag, snap.dirty, snap.patch_branch_exists
    );

    Ok(snap)
}

/// Production provider that spawns the `git` binary.
///
/// Arguments are passed as an argv array, never through a shell, so no
/// escaping is involved. Values interpolated into revision ranges are
/// still validated before use.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    workdir: Option<PathBuf>,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run all queries inside `dir` instead of the process working directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(dir.into()),
        }
    }

    /// Verify that git can be invoked at all. Read-only replacement for
    /// reachability checks that would touch the network.
    pub fn probe(&self) -> Result<()> {
        match self.run(&["--version"])? {
            Some(v) => {
                debug!("Using {v}");
                Ok(())
            }
            None => bail!("git did not report a version"),
        }
    }

    /// Check out `refname`. The one repository-state mutation this tool
    /// performs; used only for the reference-branch switch.
    pub fn checkout(&self, refname: &str) -> Result<()> {
        ensure!(
            !refname.starts_with('-'),
            "refusing to check out ref that looks like an option: {refname:?}"
        );
        match self.run(&["checkout", refname])? {
            Some(_) => Ok(()),
            None => bail!("git checkout {refname} failed"),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run git with `args`. `Ok(None)` means git ran but exited non-zero
    /// (ref not found and friends); `Err` means git could not be invoked.
    fn run(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self
            .command()
            .args(args)
            .output()
            .context("git is not installed or not in PATH")?;

        if !output.status.success() {
            debug!("git {} exited with {}", args.join(" "), output.status);
            return Ok(None);
        }

        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    fn run_count(&self, args: &[&str]) -> Result<u32> {
        Ok(self
            .run(args)?
            .and_then(|out| out.parse().ok())
            .unwrap_or(0))
    }
}

/// A value may only be spliced into a `<from>..<to>` revision range if it
/// is a plain commit hash.
fn is_commit_hash(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

impl RepoQuery for GitCli {
    fn tag_count(&self) -> Result<u32> {
        let listing = self.run(&["tag"])?.unwrap_or_default();
        let count = listing.lines().filter(|line| !line.is_empty()).count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn commit_count(&self, refname: &str) -> Result<u32> {
        ensure!(
            !refname.starts_with('-'),
            "refusing to count commits of ref that looks like an option: {refname:?}"
        );
        self.run_count(&["rev-list", "--count", refname])
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(self
            .run(&["status", "--porcelain"])?
            .is_some_and(|out| !out.is_empty()))
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        Ok(self
            .run(&["show-ref", "--verify", "--quiet", &refname])?
            .is_some())
    }

    fn latest_tag_commit(&self) -> Result<Option<String>> {
        Ok(self
            .run(&["rev-list", "--tags", "--max-count=1"])?
            .filter(|out| !out.is_empty()))
    }

    fn latest_tag_name(&self) -> Result<String> {
        Ok(self
            .run(&["describe", "--tags", "--abbrev=0"])?
            .filter(|out| !out.is_empty())
            .unwrap_or_else(|| "dev".to_string()))
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self
            .run(&["rev-parse", "--abbrev-ref", "HEAD"])?
            .filter(|out| !out.is_empty())
            .unwrap_or_else(|| "N/A".to_string()))
    }

    fn short_head_commit(&self) -> Result<String> {
        Ok(self
            .run(&["rev-parse", "--short", "HEAD"])?
            .filter(|out| !out.is_empty())
            .unwrap_or_else(|| "N/A".to_string()))
    }

    fn head_commit_epoch(&self) -> Result<Option<i64>> {
        Ok(self
            .run(&["log", "-1", "--format=%ct"])?
            .and_then(|out| out.parse().ok()))
    }

    fn commits_between(&self, from: Option<&str>, to: &str) -> Result<u32> {
        ensure!(
            !to.starts_with('-'),
            "refusing to count commits of ref that looks like an option: {to:?}"
        );
        match from {
            Some(hash) => {
                ensure!(
                    is_commit_hash(hash),
                    "cannot safely use {hash:?} in a revision range"
                );
                let range = format!("{hash}..{to}");
                self.run_count(&["rev-list", "--count", &range])
            }
            // No tag yet: the whole history is the initial version
            None => self.run_count(&["rev-list", "--count", to]),
        }
    }
}

/// Switches to the reference branch for the duration of the queries and
/// restores the original branch afterwards, including on abort paths.
pub struct BranchGuard<'a> {
    git: &'a GitCli,
    original: Option<String>,
}

impl<'a> BranchGuard<'a> {
    pub fn switch_to(git: &'a GitCli, target: &str) -> Result<Self> {
        let current = git.current_branch()?;
        if current == target {
            return Ok(Self {
                git,
                original: None,
            });
        }

        // A detached HEAD reports the literal "HEAD"; remember the commit
        // itself so the restore lands back on it
        let original = if current == "HEAD" {
            git.short_head_commit()?
        } else {
            current
        };

        info!("Switching to {target} branch...");
        git.checkout(target)
            .with_context(|| format!("could not switch to branch {target}"))?;

        Ok(Self {
            git,
            original: Some(original),
        })
    }

    /// Explicit restore on the success path, so a failure can still fail
    /// the run. The `Drop` impl covers early returns.
    pub fn restore(mut self) -> Result<()> {
        if let Some(branch) = self.original.take() {
            info!("Reverting back to original branch: {branch}");
            self.git
                .checkout(&branch)
                .with_context(|| format!("could not revert to original branch {branch}"))?;
        }
        Ok(())
    }
}

impl Drop for BranchGuard<'_> {
    fn drop(&mut self) {
        if let Some(branch) = self.original.take() {
            info!("Reverting back to original branch: {branch}");
            if let Err(e) = self.git.checkout(&branch) {
                error!("Could not revert to original branch {branch}: {e}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::PatchFloor;
    use std::fs;
    use std::path::Path;

    /// Scripted provider returning canned snapshot fields.
    struct FakeRepo {
        tags: u32,
        tag_commit: Option<String>,
        tag_name: String,
        commits_since_tag: u32,
        total_commits: u32,
        dirty: bool,
        patch_commits: Option<u32>,
    }

    impl RepoQuery for FakeRepo {
        fn tag_count(&self) -> Result<u32> {
            Ok(self.tags)
        }

        fn commit_count(&self, refname: &str) -> Result<u32> {
            assert_eq!(refname, PATCH_BRANCH, "unexpected ref counted");
            // A missing ref counts as zero, never an error
            Ok(self.patch_commits.unwrap_or(0))
        }

        fn has_uncommitted_changes(&self) -> Result<bool> {
            Ok(self.dirty)
        }

        fn branch_exists(&self, name: &str) -> Result<bool> {
            assert_eq!(name, PATCH_BRANCH, "unexpected branch probed");
            Ok(self.patch_commits.is_some())
        }

        fn latest_tag_commit(&self) -> Result<Option<String>> {
            Ok(self.tag_commit.clone())
        }

        fn latest_tag_name(&self) -> Result<String> {
            Ok(self.tag_name.clone())
        }

        fn current_branch(&self) -> Result<String> {
            Ok("main".to_string())
        }

        fn short_head_commit(&self) -> Result<String> {
            Ok("abc1234".to_string())
        }

        fn head_commit_epoch(&self) -> Result<Option<i64>> {
            Ok(Some(1_700_000_000))
        }

        fn commits_between(&self, from: Option<&str>, to: &str) -> Result<u32> {
            assert_eq!(to, "HEAD", "unexpected range endpoint");
            assert_eq!(from, self.tag_commit.as_deref(), "range must start at the tag");
            Ok(if from.is_some() {
                self.commits_since_tag
            } else {
                self.total_commits
            })
        }
    }

    #[test]
    fn test_snapshot_with_tag() {
        let fake = FakeRepo {
            tags: 2,
            tag_commit: Some("deadbeef".to_string()),
            tag_name: "v0.2".to_string(),
            commits_since_tag: 7,
            total_commits: 40,
            dirty: false,
            patch_commits: None,
        };

        let snap = snapshot(&fake).unwrap();
        assert_eq!(snap.tag_count, 2);
        assert_eq!(snap.latest_tag, "v0.2");
        assert_eq!(snap.commits_since_tag, 7);
        assert!(!snap.patch_branch_exists);
        assert_eq!(snap.patch_branch_commits, 0);
    }

    #[test]
    fn test_snapshot_without_tag_counts_full_history() {
        let fake = FakeRepo {
            tags: 0,
            tag_commit: None,
            tag_name: "dev".to_string(),
            commits_since_tag: 0,
            total_commits: 5,
            dirty: false,
            patch_commits: None,
        };

        let snap = snapshot(&fake).unwrap();
        assert_eq!(snap.tag_count, 0);
        assert_eq!(snap.commits_since_tag, 5);

        let version = snap.derive(0, PatchFloor::ClampToZero);
        assert_eq!(version.major, 0);
        assert_eq!(version.minor, 5);
        assert_eq!(version.patch, 0);
    }

    #[test]
    fn test_snapshot_with_patch_branch() {
        let fake = FakeRepo {
            tags: 2,
            tag_commit: Some("deadbeef".to_string()),
            tag_name: "v0.2".to_string(),
            commits_since_tag: 7,
            total_commits: 40,
            dirty: true,
            patch_commits: Some(10),
        };

        let snap = snapshot(&fake).unwrap();
        let version = snap.derive(0, PatchFloor::ClampToZero);
        assert_eq!(version.patch, 4);
        assert!(version.is_hotfix);
    }

    #[test]
    fn test_range_rejects_non_hash_input() {
        let git = GitCli::new();
        let err = git
            .commits_between(Some("$(rm -rf /)"), "HEAD")
            .unwrap_err();
        assert!(err.to_string().contains("revision range"));
    }

    #[test]
    fn test_ref_rejects_option_lookalike() {
        let git = GitCli::new();
        assert!(git.commit_count("--exec=evil").is_err());
    }

    // ── integration against a real repository ─────────────────────────

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args([
                "-c",
                "user.email=test@example.com",
                "-c",
                "user.name=test",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn commit(dir: &Path, message: &str) {
        git(dir, &["commit", "--allow-empty", "-m", message]);
    }

    #[test]
    fn test_real_repository_bootstrap_without_tags() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        commit(dir.path(), "one");
        commit(dir.path(), "two");

        let repo = GitCli::in_dir(dir.path());
        let snap = snapshot(&repo).unwrap();

        assert_eq!(snap.tag_count, 0);
        assert_eq!(snap.tag_commit, None);
        assert_eq!(snap.latest_tag, "dev");
        assert_eq!(snap.commits_since_tag, 2);
        assert_eq!(snap.branch, "main");
        assert!(!snap.dirty);
        assert!(!snap.patch_branch_exists);
        assert_eq!(snap.patch_branch_commits, 0);
        assert_ne!(snap.commit, "N/A");
        assert!(snap.commit_epoch.unwrap_or(0) > 0, "missing commit epoch");
    }

    #[test]
    fn test_real_repository_with_tag_and_patch_branch() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        commit(dir.path(), "one");
        commit(dir.path(), "two");
        git(dir.path(), &["tag", "v0.1"]);
        commit(dir.path(), "three");
        git(dir.path(), &["branch", PATCH_BRANCH]);
        fs::write(dir.path().join("work.txt"), "uncommitted").unwrap();

        let repo = GitCli::in_dir(dir.path());
        let snap = snapshot(&repo).unwrap();

        assert_eq!(snap.tag_count, 1);
        assert_eq!(snap.latest_tag, "v0.1");
        assert_eq!(snap.commits_since_tag, 1);
        assert!(snap.dirty);
        assert!(snap.patch_branch_exists);
        assert_eq!(snap.patch_branch_commits, 3);

        // 3 on patch + 1 dirty - 1 counted in minor
        let version = snap.derive(0, PatchFloor::ClampToZero);
        assert_eq!(version.major, 1);
        assert_eq!(version.minor, 1);
        assert_eq!(version.patch, 3);
        assert!(version.is_hotfix);
    }

    #[test]
    fn test_missing_ref_counts_as_zero() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        commit(dir.path(), "one");

        let repo = GitCli::in_dir(dir.path());
        assert_eq!(repo.commit_count("no-such-branch").unwrap(), 0);
        assert!(!repo.branch_exists("no-such-branch").unwrap());
    }

    #[test]
    fn test_branch_guard_switches_and_restores() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        commit(dir.path(), "one");
        git(dir.path(), &["checkout", "-b", "feature"]);

        let repo = GitCli::in_dir(dir.path());
        {
            let guard = BranchGuard::switch_to(&repo, "main").unwrap();
            assert_eq!(repo.current_branch().unwrap(), "main");
            guard.restore().unwrap();
        }
        assert_eq!(repo.current_branch().unwrap(), "feature");
    }

    #[test]
    fn test_branch_guard_restores_on_drop() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        commit(dir.path(), "one");
        git(dir.path(), &["checkout", "-b", "feature"]);

        let repo = GitCli::in_dir(dir.path());
        {
            let _guard = BranchGuard::switch_to(&repo, "main").unwrap();
            assert_eq!(repo.current_branch().unwrap(), "main");
            // dropped without an explicit restore, as on an abort path
        }
        assert_eq!(repo.current_branch().unwrap(), "feature");
    }

    #[test]
    fn test_branch_guard_restores_detached_head() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        commit(dir.path(), "one");
        commit(dir.path(), "two");
        git(dir.path(), &["checkout", "HEAD~1"]);

        let repo = GitCli::in_dir(dir.path());
        let before = repo.short_head_commit().unwrap();
        assert_eq!(repo.current_branch().unwrap(), "HEAD");

        let guard = BranchGuard::switch_to(&repo, "main").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "main");
        guard.restore().unwrap();

        assert_eq!(
            repo.current_branch().unwrap(),
            "HEAD",
            "working copy should be detached again"
        );
        assert_eq!(
            repo.short_head_commit().unwrap(),
            before,
            "working copy should sit on the original commit"
        );
    }

    #[test]
    fn test_branch_guard_noop_when_already_on_target() {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        commit(dir.path(), "one");

        let repo = GitCli::in_dir(dir.path());
        let guard = BranchGuard::switch_to(&repo, "main").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "main");
        guard.restore().unwrap();
        assert_eq!(repo.current_branch().unwrap(), "main");
    }
}
