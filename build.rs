use std::process::Command;

fn main() {
    // Allow overriding the reported version (e.g. for CI release builds)
    let version = std::env::var("GIT_VERSION").unwrap_or_else(|_| {
        Command::new("git")
            .args(["describe", "--tags", "--always", "--dirty"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| String::from_utf8(output.stdout).ok())
            .map_or_else(|| "dev".to_string(), |s| s.trim().to_string())
    });

    println!("cargo:rustc-env=GIT_VERSION={version}");

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");
    println!("cargo:rerun-if-env-changed=GIT_VERSION");
}
