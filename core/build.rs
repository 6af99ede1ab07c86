use std::process::Command;

fn main() {
    let ts = chrono::Utc::now().to_rfc3339();
    println!("cargo:rustc-env=CORE_BUILD_TIMESTAMP={}", ts);

    if let Some(sha) = git(&["rev-parse", "--short", "HEAD"]) {
        println!("cargo:rustc-env=CORE_GIT_SHA={}", sha);
    }
    if let Some(tag) = git(&["describe", "--tags", "--abbrev=0"]) {
        println!("cargo:rustc-env=CORE_GIT_TAG={}", tag);
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
