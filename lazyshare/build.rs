// Rejects lint-suppression attributes ("#[" + "allow" + ...) in lazyshare sources.
// Runs on every build; set CHECK_NO_ALLOW=0 to skip it.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const SCANNED: [&str; 3] = ["src", "tests", "examples"];
const SKIPPED_DIRS: [&str; 2] = ["target", ".git"];

fn main() {
    for dir in SCANNED {
        println!("cargo:rerun-if-changed={dir}");
    }
    println!("cargo:rerun-if-env-changed=CHECK_NO_ALLOW");

    if env::var("CHECK_NO_ALLOW").is_ok_and(|v| v == "0") {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let mut violations = Vec::new();
    for dir in SCANNED {
        let path = manifest_dir.join(dir);
        if path.exists() {
            collect_violations(&path, &mut violations);
        }
    }

    if violations.is_empty() {
        return;
    }

    eprintln!("ERROR: lint suppression attributes found in lazyshare:");
    for (file, line, content) in &violations {
        eprintln!("  {}:{}: {}", file.display(), line, content.trim());
    }
    panic!("{} lint suppression attribute(s) found", violations.len());
}

fn collect_violations(path: &Path, violations: &mut Vec<(PathBuf, usize, String)>) {
    if path.is_dir() {
        if SKIPPED_DIRS.iter().any(|dir| path.ends_with(dir)) {
            return;
        }
        for entry in fs::read_dir(path).expect("read dir") {
            collect_violations(&entry.expect("dir entry").path(), violations);
        }
        return;
    }

    if path.extension().is_none_or(|ext| ext != "rs") {
        return;
    }

    if let Ok(content) = fs::read_to_string(path) {
        violations.extend(
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| line.contains("#[allow") || line.contains("#![allow"))
                .map(|(idx, line)| (path.to_path_buf(), idx + 1, line.to_string())),
        );
    }
}
