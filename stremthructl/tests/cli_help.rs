use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

fn help_text(args: &[&str]) -> String {
    let mut cmd = cargo_bin_cmd!("stremthructl");
    let output = cmd
        .args(args)
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn top_level_help_lists_commands() {
    let text = help_text(&[]);
    for command in ["migrate", "merge", "resolve", "repair", "list"] {
        assert!(text.contains(command), "help missing '{command}'");
    }
    assert!(text.contains("--config"), "help missing --config");
}

#[test]
fn merge_help_mentions_anchor() {
    let text = help_text(&["merge"]);
    assert!(text.contains("--anchor"), "merge help missing --anchor");
}

#[test]
fn resolve_help_mentions_target_and_type() {
    let text = help_text(&["resolve"]);
    assert!(text.contains("--to"), "resolve help missing --to");
    assert!(text.contains("--type"), "resolve help missing --type");
}

#[test]
fn unknown_provider_is_rejected_by_the_parser() {
    let mut cmd = cargo_bin_cmd!("stremthructl");
    cmd.args(["list", "netflix", "watchlist"]).assert().failure();
}

#[test]
fn migrate_then_inspect_missing_list() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("stremthru.db");
    let config = dir.path().join("stremthru.toml");
    fs::write(
        &config,
        format!("[database]\nurl = \"sqlite://{}\"\n", db.display()),
    )
    .expect("write config");

    let mut migrate = cargo_bin_cmd!("stremthructl");
    migrate
        .current_dir(dir.path())
        .env_remove("DATABASE_URL")
        .env_remove("STREMTHRU_PROVIDERS")
        .env_remove("REDIS_URL")
        .args(["--config"])
        .arg(&config)
        .arg("migrate")
        .assert()
        .success();

    let mut list = cargo_bin_cmd!("stremthructl");
    let output = list
        .current_dir(dir.path())
        .env_remove("DATABASE_URL")
        .env_remove("STREMTHRU_PROVIDERS")
        .env_remove("REDIS_URL")
        .args(["--config"])
        .arg(&config)
        .args(["list", "trakt", "watchlist"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("\"missing\""), "unexpected status: {text}");
}
