use serde::Serialize;

/// State of the repository at the moment the tool runs. Built once per
/// invocation from live queries, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RepoSnapshot {
    /// Commit hash of the most recent tag reachable by any ref.
    pub tag_commit: Option<String>,
    /// Nearest reachable tag name, `"dev"` when the repository has no tags.
    pub latest_tag: String,
    pub branch: String,
    pub commit: String,
    /// Seconds since epoch of HEAD's commit, if the query produced one.
    pub commit_epoch: Option<i64>,
    pub tag_count: u32,
    /// Commits between `tag_commit` and HEAD, or the full history count
    /// when no tag exists.
    pub commits_since_tag: u32,
    pub dirty: bool,
    pub patch_branch_exists: bool,
    pub patch_branch_commits: u32,
}

/// What to do when the patch formula goes negative (patch branch exists,
/// tree is clean, and the branch carries fewer commits than `minor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFloor {
    ClampToZero,
    AllowNegative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedVersion {
    pub release: i64,
    pub major: u32,
    pub minor: u32,
    pub patch: i64,
    pub is_hotfix: bool,
}

impl RepoSnapshot {
    /// Derive the version triple from this snapshot.
    ///
    /// - `major` counts tags: each tag marks one completed release cycle,
    ///   so no manual bump bookkeeping is needed.
    /// - `minor` counts commits since the latest tag (or all commits when
    ///   no tag exists yet).
    /// - `patch` counts commits unique to the long-lived `patch` branch.
    ///   That branch normally includes everything already counted in
    ///   `minor`, so `minor` is subtracted back out. An uncommitted local
    ///   change contributes +1 regardless: dirty work in progress is
    ///   itself an unreleased patch.
    pub fn derive(&self, release: i64, floor: PatchFloor) -> DerivedVersion {
        let major = self.tag_count;
        let minor = self.commits_since_tag;

        let mut patch = i64::from(self.patch_branch_commits) + i64::from(self.dirty)
            - if self.patch_branch_exists {
                i64::from(minor)
            } else {
                0
            };
        if floor == PatchFloor::ClampToZero {
            patch = patch.max(0);
        }

        DerivedVersion {
            release,
            major,
            minor,
            patch,
            is_hotfix: patch > 0,
        }
    }
}

impl DerivedVersion {
    /// Dotted form used for the GIT_VERSION constant.
    pub fn dotted(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.release, self.major, self.minor, self.patch
        )
    }
}
