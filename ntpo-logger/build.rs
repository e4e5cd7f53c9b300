//! Build script for ntpo-logger
//!
//! Exports the build identification logged at startup as compile-time
//! environment variables: `GIT_HASH`, `BUILD_TIMESTAMP`, `BUILD_PROFILE`.

use std::process::Command;

/// Short commit hash of the checkout; `None` outside a git work tree
fn git_hash() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short=8", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_owned())
}

fn export(key: &str, value: &str) {
    println!("cargo:rustc-env={}={}", key, value);
}

fn main() {
    export("GIT_HASH", &git_hash().unwrap_or_else(|| "unknown".to_owned()));
    export(
        "BUILD_TIMESTAMP",
        &chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    export(
        "BUILD_PROFILE",
        &std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_owned()),
    );

    // No rerun-if-changed: rerun every build so the hash and timestamp stay current
}
