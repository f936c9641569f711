use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::*;
use std::fs;
use std::path::PathBuf;
use tracing::info;

mod git;
mod render;
mod types;

use git::{BranchGuard, GitCli};
use render::HeaderConfig;
use types::{DerivedVersion, PatchFloor, RepoSnapshot};

#[derive(Parser, Debug)]
#[command(version = env!("GIT_VERSION"), about = "Derive a version triple from git history and emit a C/C++ version header", long_about = None)]
struct Args {
    /// Directory the version header is written into
    #[arg(short = 'o', long, env = "VERSTAMP_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Application name (first letter is uppercased)
    #[arg(short = 'n', long, default_value = "N/A")]
    app_name: String,

    /// Symbol prefix for the generated constants
    #[arg(short = 'p', long, env = "VERSTAMP_PREFIX", default_value = "VER")]
    prefix: String,

    /// Engine name
    #[arg(short = 'e', long, default_value = "N/A")]
    engine: String,

    /// Author name
    #[arg(short = 'a', long, default_value = "N/A")]
    author: String,

    /// Copyright start year (defaults to the current year)
    #[arg(short = 's', long)]
    start_year: Option<i32>,

    /// Change into this directory before doing anything else
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Release number, written to the header unchanged
    #[arg(long, default_value_t = 0)]
    release_num: i64,

    /// Steam app id written to the header
    #[arg(long, default_value_t = -1)]
    steam_id: i64,

    /// Reference branch to derive from; the current branch is restored afterwards
    #[arg(short = 'b', long, env = "VERSTAMP_BRANCH", default_value = "main")]
    branch: String,

    /// Emit a negative patch component instead of clamping it to zero
    #[arg(long)]
    allow_negative_patch: bool,

    /// Print the snapshot and derived version as JSON to stdout
    #[arg(long)]
    json: bool,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,
}

/// Machine-readable counterpart of the verbose summary.
#[derive(serde::Serialize)]
struct Summary<'a> {
    snapshot: &'a RepoSnapshot,
    version: &'a DerivedVersion,
}

fn capitalize_first(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(dir) = &args.cwd {
        std::env::set_current_dir(dir)
            .with_context(|| format!("could not change working directory to {}", dir.display()))?;
    }

    // Initialize logging; quiet by default, diagnostics only with --verbose
    let filter = if args.verbose {
        "verstamp=debug"
    } else {
        "verstamp=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .init();

    if args.verbose {
        println!("{}", "verstamp".bright_cyan().bold());
        println!("{}", "========".bright_cyan());
        println!();
    }

    let git = GitCli::new();
    git.probe()?;

    // Query against the reference branch; whatever happens from here on,
    // the working copy is left on the branch we found it on
    let guard = BranchGuard::switch_to(&git, &args.branch)?;

    let snap = git::snapshot(&git)?;

    let floor = if args.allow_negative_patch {
        PatchFloor::AllowNegative
    } else {
        PatchFloor::ClampToZero
    };
    let version = snap.derive(args.release_num, floor);

    let cfg = HeaderConfig {
        app: capitalize_first(&args.app_name),
        engine: args.engine,
        author: args.author,
        prefix: args.prefix,
        start_year: args.start_year,
        steam_appid: args.steam_id,
    };

    let header = render::render(&cfg, &snap, &version, Utc::now());

    let output_path = args.output_dir.join("version.h");
    fs::write(&output_path, header)
        .with_context(|| format!("could not write to {}", output_path.display()))?;

    guard.restore()?;

    info!("Version header written to: {}", output_path.display());

    if args.json {
        let summary = Summary {
            snapshot: &snap,
            version: &version,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if args.verbose {
        println!(
            "{} {} {}",
            "Tag:".bright_blue(),
            snap.latest_tag.bright_white(),
            format!("({})", snap.commit).bright_black()
        );
        println!(
            "{} {}",
            "Version:".bright_blue(),
            version.dotted().bright_white()
        );
        println!("{} {}", "Branch:".bright_blue(), snap.branch.bright_white());
        if version.is_hotfix {
            println!("{} {}", "!".bright_yellow(), "hotfix build".bright_yellow());
        }
        println!();
        println!(
            "{} Version header written to {}",
            "✓".bright_green(),
            output_path.display().to_string().bright_white()
        );
    }

    Ok(())
}
