use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::types::{DerivedVersion, RepoSnapshot};

/// Descriptive values supplied by the caller, not derived from the
/// repository. Constructed once from the CLI flags.
#[derive(Debug, Clone)]
pub struct HeaderConfig {
    pub app: String,
    pub engine: String,
    pub author: String,
    /// Symbol prefix: constants are emitted as `{PREFIX}_{FIELD}`.
    pub prefix: String,
    /// Copyright start year; the current UTC year when absent.
    pub start_year: Option<i32>,
    pub steam_appid: i64,
}

/// Split a UTC timestamp into the `YYYY-MM-DD` and `HH:MM:SS` parts used
/// throughout the header.
pub fn split_timestamp(ts: DateTime<Utc>) -> (String, String) {
    (
        ts.format("%Y-%m-%d").to_string(),
        ts.format("%H:%M:%S").to_string(),
    )
}

/// Commit timestamp as date and time strings, `"N/A"` for both when the
/// epoch is absent, zero, or out of range.
pub fn commit_timestamp(epoch: Option<i64>) -> (String, String) {
    epoch
        .filter(|&seconds| seconds > 0)
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        .map_or_else(
            || ("N/A".to_string(), "N/A".to_string()),
            split_timestamp,
        )
}

pub fn copyright(start_year: Option<i32>, now: DateTime<Utc>) -> String {
    let current = now.year();
    format!("\u{a9} {} - {current}", start_year.unwrap_or(current))
}

pub const fn build_type() -> &'static str {
    if cfg!(debug_assertions) {
        "Debug"
    } else {
        "Release"
    }
}

/// Render the generated header.
///
/// Layout matters to downstream consumers: include guard, one `#define`
/// per constant, hotfix flag as 0/1.
pub fn render(
    cfg: &HeaderConfig,
    snap: &RepoSnapshot,
    version: &DerivedVersion,
    now: DateTime<Utc>,
) -> String {
    let p = &cfg.prefix;
    let (build_date, build_time) = split_timestamp(now);
    let (commit_date, commit_time) = commit_timestamp(snap.commit_epoch);
    let notice = copyright(cfg.start_year, now);

    let mut lines = vec![
        "/*".to_string(),
        " *************************************".to_string(),
        " * DO NOT MODIFY THIS FILE.          *".to_string(),
        " * Auto-generated version header.    *".to_string(),
        format!(" * Generated on {build_date}T{build_time}Z *"),
        " *************************************".to_string(),
        "*/".to_string(),
        String::new(),
        "#ifndef VERSION_H".to_string(),
        "#define VERSION_H".to_string(),
        String::new(),
        format!("#define {p}_APPLICATION_NAME \"{}\"", cfg.app),
        format!("#define {p}_ENGINE_NAME \"{}\"", cfg.engine),
        format!("#define {p}_AUTHOR \"{}\"", cfg.author),
        format!("#define {p}_COPYRIGHT \"{notice}\""),
        String::new(),
        format!("#define {p}_GIT_TAG \"{}\"", snap.latest_tag),
        format!("#define {p}_GIT_VERSION \"{}\"", version.dotted()),
        format!("#define {p}_GIT_VERSION_RELEASE {}", version.release),
        "// bumped once for each associated tag".to_string(),
        format!("#define {p}_GIT_VERSION_MAJOR {}", version.major),
        "// bumped for each commit on main branch".to_string(),
        "// minus what was bumped because of PATCH".to_string(),
        format!("#define {p}_GIT_VERSION_MINOR {}", version.minor),
        "// bumped once for uncommited changes".to_string(),
        "// and for each commit on PATCH branch".to_string(),
        format!("#define {p}_GIT_VERSION_PATCH {}", version.patch),
        format!("#define {p}_GIT_BRANCH \"{}\"", snap.branch),
        format!("#define {p}_GIT_COMMIT \"{}\"", snap.commit),
        format!("#define {p}_GIT_DATE \"{commit_date}\""),
        format!("#define {p}_GIT_TIME \"{commit_time}\""),
        String::new(),
        format!("#define {p}_BUILD_DATE \"{build_date}\""),
        format!("#define {p}_BUILD_TIME \"{build_time}\""),
        format!("#define {p}_BUILD_TYPE \"{}\"", build_type()),
        String::new(),
        format!("#define {p}_IS_HOTFIX {}", i32::from(version.is_hotfix)),
        String::new(),
        format!("#define {p}_STEAM_APPID {}", cfg.steam_appid),
        String::new(),
        "#endif // VERSION_H".to_string(),
    ];
    lines.push(String::new());

    lines.join("\n")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::types::PatchFloor;

    fn config() -> HeaderConfig {
        HeaderConfig {
            app: "Demo".to_string(),
            engine: "Engine".to_string(),
            author: "Someone".to_string(),
            prefix: "VER".to_string(),
            start_year: Some(2023),
            steam_appid: -1,
        }
    }

    fn snapshot() -> RepoSnapshot {
        RepoSnapshot {
            tag_commit: Some("deadbeef".to_string()),
            latest_tag: "v0.2".to_string(),
            branch: "main".to_string(),
            commit: "abc1234".to_string(),
            commit_epoch: Some(1_700_000_000),
            tag_count: 2,
            commits_since_tag: 7,
            dirty: false,
            patch_branch_exists: false,
            patch_branch_commits: 0,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_header_contains_all_constants() {
        let snap = snapshot();
        let version = snap.derive(1, PatchFloor::ClampToZero);
        let header = render(&config(), &snap, &version, noon());

        assert!(header.contains("#define VER_APPLICATION_NAME \"Demo\""));
        assert!(header.contains("#define VER_ENGINE_NAME \"Engine\""));
        assert!(header.contains("#define VER_AUTHOR \"Someone\""));
        assert!(header.contains("#define VER_GIT_TAG \"v0.2\""));
        assert!(header.contains("#define VER_GIT_VERSION \"1.2.7.0\""));
        assert!(header.contains("#define VER_GIT_VERSION_RELEASE 1"));
        assert!(header.contains("#define VER_GIT_VERSION_MAJOR 2"));
        assert!(header.contains("#define VER_GIT_VERSION_MINOR 7"));
        assert!(header.contains("#define VER_GIT_VERSION_PATCH 0"));
        assert!(header.contains("#define VER_GIT_BRANCH \"main\""));
        assert!(header.contains("#define VER_GIT_COMMIT \"abc1234\""));
        assert!(header.contains("#define VER_BUILD_DATE \"2026-03-14\""));
        assert!(header.contains("#define VER_BUILD_TIME \"12:30:45\""));
        assert!(header.contains("#define VER_IS_HOTFIX 0"));
        assert!(header.contains("#define VER_STEAM_APPID -1"));
        assert!(header.starts_with("/*"));
        assert!(header.contains("#ifndef VERSION_H"));
        assert!(header.ends_with("#endif // VERSION_H\n"));
    }

    #[test]
    fn test_custom_prefix_is_applied_everywhere() {
        let cfg = HeaderConfig {
            prefix: "GAME".to_string(),
            ..config()
        };
        let snap = snapshot();
        let version = snap.derive(0, PatchFloor::ClampToZero);
        let header = render(&cfg, &snap, &version, noon());

        assert!(header.contains("#define GAME_GIT_TAG"));
        assert!(!header.contains("#define VER_"));
    }

    #[test]
    fn test_missing_tag_renders_dev() {
        let snap = RepoSnapshot {
            latest_tag: "dev".to_string(),
            tag_commit: None,
            tag_count: 0,
            ..snapshot()
        };
        let version = snap.derive(0, PatchFloor::ClampToZero);
        let header = render(&config(), &snap, &version, noon());

        assert!(header.contains("#define VER_GIT_TAG \"dev\""));
    }

    #[test]
    fn test_missing_commit_epoch_renders_na() {
        for epoch in [None, Some(0), Some(-5)] {
            let snap = RepoSnapshot {
                commit_epoch: epoch,
                ..snapshot()
            };
            let version = snap.derive(0, PatchFloor::ClampToZero);
            let header = render(&config(), &snap, &version, noon());

            assert!(header.contains("#define VER_GIT_DATE \"N/A\""));
            assert!(header.contains("#define VER_GIT_TIME \"N/A\""));
        }
    }

    #[test]
    fn test_commit_timestamp_formats_as_utc() {
        // 2023-11-14 22:13:20 UTC
        let (date, time) = commit_timestamp(Some(1_700_000_000));
        assert_eq!(date, "2023-11-14");
        assert_eq!(time, "22:13:20");
    }

    #[test]
    fn test_hotfix_flag_renders_as_one() {
        let snap = RepoSnapshot {
            dirty: true,
            ..snapshot()
        };
        let version = snap.derive(0, PatchFloor::ClampToZero);
        let header = render(&config(), &snap, &version, noon());

        assert!(header.contains("#define VER_IS_HOTFIX 1"));
    }

    #[test]
    fn test_copyright_with_start_year() {
        assert_eq!(copyright(Some(2023), noon()), "\u{a9} 2023 - 2026");
    }

    #[test]
    fn test_copyright_defaults_to_current_year() {
        assert_eq!(copyright(None, noon()), "\u{a9} 2026 - 2026");
    }

    #[test]
    fn test_banner_box_is_aligned() {
        let snap = snapshot();
        let version = snap.derive(0, PatchFloor::ClampToZero);
        let header = render(&config(), &snap, &version, noon());

        let lines: Vec<&str> = header.lines().take(7).collect();
        assert_eq!(lines[0], "/*");
        assert_eq!(lines[6], "*/");
        // The frame and the three framed lines all share one width; the
        // timestamp formats are fixed-width, so this holds for any date
        let width = lines[1].len();
        for line in &lines[1..6] {
            assert_eq!(line.len(), width, "banner box line out of alignment");
        }
    }

    #[test]
    fn test_generated_banner_carries_build_stamp() {
        let snap = snapshot();
        let version = snap.derive(0, PatchFloor::ClampToZero);
        let header = render(&config(), &snap, &version, noon());

        assert!(header.contains("Generated on 2026-03-14T12:30:45Z"));
    }
}
