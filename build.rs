//! Fails the build when the VERSION file and Cargo.toml disagree.

use std::{env, fs, process};

fn main() {
    println!("cargo:rerun-if-changed=VERSION");

    let release = match fs::read_to_string("VERSION") {
        Ok(raw) => raw.trim().to_string(),
        Err(e) => {
            eprintln!("error: cannot read VERSION: {}", e);
            process::exit(1);
        }
    };
    let package = env::var("CARGO_PKG_VERSION").unwrap_or_default();

    if release != package {
        eprintln!(
            "error: VERSION is {} but Cargo.toml is {}; release both together",
            release, package
        );
        process::exit(1);
    }
}
