mod common;

use std::sync::Arc;
use std::time::Duration;
use codeatlas::{AtlasError, RepoRef};
use common::test_helpers::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn sample_repo() -> TempDir {
    let repo = TempDir::new().unwrap();
    write_tree(
        repo.path(),
        &[
            ("README.md", "# Shop\nA tiny shop."),
            ("src/main.py", "from store import Store\n\nStore().run()\n"),
            ("src/store.py", "class Store:\n    def run(self):\n        pass\n"),
            ("node_modules/left-pad/index.js", "module.exports = 1;"),
            ("tests/test_store.py", "def test_store(): pass"),
            ("package-lock.json", "{}"),
        ],
    );
    std::fs::write(repo.path().join("logo.bin"), [0u8, 159, 146, 150, 0, 1]).unwrap();
    repo
}

#[tokio::test]
async fn test_directory_analysis_end_to_end() {
    setup_test_logger();
    let data = TempDir::new().unwrap();
    let repo = sample_repo();
    let backend = MockBackend::new(DIAGRAM_REPLY);
    let atlas = atlas_with(&data, backend.clone());

    let report = atlas
        .analyze(&RepoRef::Directory(repo.path().to_path_buf()))
        .await
        .unwrap();

    assert_eq!(report.included_paths, vec!["README.md", "src/main.py", "src/store.py"]);
    assert_eq!(report.diagram.node_count(), 2);
    assert_eq!(report.diagram.edge_count(), 1);
    assert!(report.budget_warning.is_none());
    assert_eq!(report.stats.files_processed, 3);
    assert_eq!(report.summary, DIAGRAM_REPLY);
    assert_eq!(backend.prompts.lock().unwrap().len(), 2, "one diagram call and one summary call");

    let prompt = backend.last_prompt();
    assert!(prompt.contains("<file name=\"src/store.py\">"));
    assert!(!prompt.contains("left-pad"));
    assert!(!prompt.contains("test_store"));

    let saved = report.saved.expect("diagram should be saved");
    let recent = atlas.list_recent(10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, saved.id);
    assert_eq!(atlas.history().load(&saved.id).await.unwrap(), report.diagram.raw_text);
}

#[tokio::test]
async fn test_small_budget_reports_dropped_files() {
    let data = TempDir::new().unwrap();
    let repo = sample_repo();
    let mut config = test_config(&data);
    config.processing.context_budget = 80;
    let atlas = codeatlas::CodeAtlas::with_backend(config, MockBackend::new(DIAGRAM_REPLY)).unwrap();

    let report = atlas
        .analyze(&RepoRef::Directory(repo.path().to_path_buf()))
        .await
        .unwrap();

    assert_eq!(report.included_paths, vec!["README.md"]);
    let warning = report.budget_warning.expect("budget should bind");
    assert!(warning.contains("80 bytes"));
    assert!(warning.contains("src/main.py"));
}

#[tokio::test]
async fn test_invalid_diagram_is_not_saved() {
    let data = TempDir::new().unwrap();
    let repo = sample_repo();
    let atlas = atlas_with(&data, MockBackend::new("```dot\ndigraph { api; api -> cache; }\n```"));

    let error = atlas
        .analyze(&RepoRef::Directory(repo.path().to_path_buf()))
        .await
        .unwrap_err();

    assert!(matches!(error, AtlasError::InvalidDiagram(_)));
    assert!(error.to_string().contains("cache"));
    assert!(atlas.list_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_stay_isolated() {
    let data = TempDir::new().unwrap();
    let alpha = TempDir::new().unwrap();
    let beta = TempDir::new().unwrap();
    write_tree(alpha.path(), &[("alpha.py", "print('alpha')")]);
    write_tree(beta.path(), &[("beta.py", "print('beta')"), ("beta_util.py", "X = 1")]);
    let atlas = atlas_with(&data, Arc::new(EchoPaths));

    let alpha_ref = RepoRef::Directory(alpha.path().to_path_buf());
    let beta_ref = RepoRef::Directory(beta.path().to_path_buf());
    let (a, b) = tokio::join!(atlas.analyze(&alpha_ref), atlas.analyze(&beta_ref));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.included_paths, vec!["alpha.py"]);
    assert_eq!(b.included_paths, vec!["beta.py", "beta_util.py"]);
    assert!(a.diagram.raw_text.contains("alpha.py"));
    assert!(!a.diagram.raw_text.contains("beta"));
    assert_eq!(b.diagram.node_count(), 2);
    assert_eq!(atlas.list_recent(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_model_timeout_names_the_operation() {
    let data = TempDir::new().unwrap();
    let repo = sample_repo();
    let mut config = test_config(&data);
    config.timeouts.model_secs = 1;
    let backend = MockBackend::delayed("too late", Duration::from_secs(5));
    let atlas = codeatlas::CodeAtlas::with_backend(config, backend).unwrap();

    let error = atlas
        .summarize(&RepoRef::Directory(repo.path().to_path_buf()))
        .await
        .unwrap_err();

    assert!(matches!(error, AtlasError::Timeout { ref operation, .. } if operation == "summary generation"));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_summary_and_chat() {
    let data = TempDir::new().unwrap();
    let repo = sample_repo();
    let backend = MockBackend::new("It is a shop.");
    let atlas = atlas_with(&data, backend.clone());
    let repo_ref = RepoRef::Directory(repo.path().to_path_buf());

    let summary = atlas.summarize(&repo_ref).await.unwrap();
    assert_eq!(summary.summary, "It is a shop.");

    let history = vec![
        codeatlas::llm::ChatMessage::user("What is this?"),
        codeatlas::llm::ChatMessage::assistant("A shop."),
    ];
    let answer = atlas.chat(&repo_ref, "Where is Store defined?", &history).await.unwrap();
    assert_eq!(answer, "It is a shop.");
    assert!(backend.last_prompt().ends_with("Current question: Where is Store defined?"));
}

#[tokio::test]
async fn test_uploaded_archive() {
    let data = TempDir::new().unwrap();
    let atlas = atlas_with(&data, MockBackend::new(DIAGRAM_REPLY));
    let bytes = zip_bytes("shop-main", &[("app.py", "import db"), ("db.py", "CONN = None")]);

    let report = atlas
        .analyze(&RepoRef::Upload { name: "shop.zip".into(), bytes })
        .await
        .unwrap();

    assert_eq!(report.repo_name, "shop");
    assert_eq!(report.included_paths, vec!["app.py", "db.py"]);
}

#[tokio::test]
async fn test_build_output_does_not_count_against_the_byte_cap() {
    let data = TempDir::new().unwrap();
    let repo = sample_repo();
    let bundle = "x".repeat(40_000);
    let dump = "y".repeat(60_000);
    write_tree(
        repo.path(),
        &[
            ("node_modules/huge/dist.js", bundle.as_str()),
            ("target/debug/app.d", bundle.as_str()),
            ("data/dump.sql", dump.as_str()),
        ],
    );

    let mut config = test_config(&data);
    config.processing.max_archive_bytes = 20_000;
    let backend = MockBackend::new(DIAGRAM_REPLY);
    let atlas = codeatlas::CodeAtlas::with_backend(config, backend).unwrap();

    let prepared = atlas
        .prepare_context(&RepoRef::Directory(repo.path().to_path_buf()))
        .await
        .unwrap();
    assert_eq!(prepared.context.included_paths, vec!["README.md", "src/main.py", "src/store.py"]);
}
