use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::*;
use tempfile::TempDir;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

#[fixture]
fn conf_dir() -> TempDir {
    TempDir::new().unwrap()
}

#[rstest]
fn stats_on_empty_index(conf_dir: TempDir) -> Result<()> {
    cargo_run!("dejaview", "-c", conf_dir.path(), "stats", "--output-format", "json")
        .success()
        .stdout(predicate::str::contains("\"phash\""))
        .stdout(predicate::str::contains("\"clip\""))
        .stdout(predicate::str::contains("\"total_vectors\": 0"));

    assert!(conf_dir.path().join("indices").is_dir());
    Ok(())
}

#[rstest]
#[case::dino("dino")]
#[case::siglip("siglip")]
fn stats_uses_signal_names(conf_dir: TempDir, #[case] name: &str) -> Result<()> {
    cargo_run!("dejaview", "-c", conf_dir.path(), "stats", "--primary-name", name)
        .success()
        .stdout(predicate::str::contains(name));
    Ok(())
}

#[rstest]
fn check_unreadable_image(conf_dir: TempDir) -> Result<()> {
    let missing = conf_dir.path().join("missing.png");

    cargo_run!("dejaview", "-c", conf_dir.path(), "check", &missing, "--output-format", "json")
        .success()
        .stdout(predicate::str::contains("\"status\": \"Unique\""))
        .stdout(predicate::str::contains("missing.png"))
        .stdout(predicate::str::contains("\"error\": null").not());
    Ok(())
}

#[rstest]
fn check_requires_image(conf_dir: TempDir) -> Result<()> {
    cargo_run!("dejaview", "-c", conf_dir.path(), "check").failure();
    Ok(())
}

#[rstest]
fn add_empty_directory(conf_dir: TempDir) -> Result<()> {
    let images = conf_dir.path().join("images");
    std::fs::create_dir_all(&images)?;

    cargo_run!("dejaview", "-c", conf_dir.path(), "add", &images).success();
    cargo_run!("dejaview", "-c", conf_dir.path(), "stats")
        .success()
        .stdout(predicate::str::contains("0 个向量"));
    Ok(())
}
