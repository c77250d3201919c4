use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn codeatlas(workdir: &TempDir) -> Command {
    let config = workdir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();

    let mut cmd = Command::cargo_bin("codeatlas").unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(workdir.path().join("data"));
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("codeatlas")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("summarize"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("render"));
}

#[test]
fn test_render_rejects_undeclared_nodes() {
    let workdir = TempDir::new().unwrap();
    let dot = workdir.path().join("broken.dot");
    std::fs::write(&dot, "digraph { api; api -> cache; }").unwrap();

    codeatlas(&workdir)
        .arg("render")
        .arg(&dot)
        .arg("-o")
        .arg(workdir.path().join("out.svg"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("undeclared node 'cache'"));

    assert!(!workdir.path().join("out.svg").exists());
}

#[test]
fn test_render_reports_syntax_position() {
    let workdir = TempDir::new().unwrap();
    let dot = workdir.path().join("broken.dot");
    std::fs::write(&dot, "digraph {\n  a;\n  a -> ;\n}").unwrap();

    codeatlas(&workdir)
        .arg("render")
        .arg(&dot)
        .arg("-o")
        .arg(workdir.path().join("out.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 3"));
}

#[test]
fn test_render_rejects_unknown_format() {
    let workdir = TempDir::new().unwrap();
    let dot = workdir.path().join("ok.dot");
    std::fs::write(&dot, "digraph { a; }").unwrap();

    codeatlas(&workdir)
        .arg("render")
        .arg(&dot)
        .arg("-o")
        .arg(workdir.path().join("out.gif"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported render format"));
}

#[test]
fn test_empty_history() {
    let workdir = TempDir::new().unwrap();

    codeatlas(&workdir)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved diagrams yet."));
}

#[test]
fn test_invalid_repo_input() {
    let workdir = TempDir::new().unwrap();

    codeatlas(&workdir)
        .arg("summarize")
        .arg("https://gitlab.com/acme/shop")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported input"));
}
