use formscrub::config::{BatchConfig, Mode, SanitizeConfig};
use formscrub::{run_batch, SanitizationEngine};
use tempfile::TempDir;

use crate::fixtures::{contains_text, form_pdf, TEMPLATE_PAGE};

async fn populate(dir: &std::path::Path, names: &[&str]) {
    for name in names {
        tokio::fs::write(dir.join(name), form_pdf(TEMPLATE_PAGE)).await.unwrap();
    }
}

#[tokio::test]
async fn test_batch_selects_only_unprocessed_forms() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["form_CA.pdf", "form_CA_cleared.pdf", "test_form.pdf"]).await;

    let engine = SanitizationEngine::default();
    let summary = run_batch(&engine, dir.path(), &BatchConfig::default(), None)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.outcomes[0].input.file_name().unwrap(), "form_CA.pdf");

    let output = dir.path().join("cleared_pdfs").join("form_CA.pdf");
    assert_eq!(summary.outcomes[0].output, output);
    let written = tokio::fs::read(&output).await.unwrap();
    assert!(!contains_text(&written, "John Smith"));
}

#[tokio::test]
async fn test_second_batch_ignores_its_own_output() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["a.pdf", "b.pdf"]).await;
    let engine = SanitizationEngine::default();

    let first = run_batch(&engine, dir.path(), &BatchConfig::default(), None).await.unwrap();
    let second = run_batch(&engine, dir.path(), &BatchConfig::default(), None).await.unwrap();
    assert_eq!(first.succeeded, 2);
    assert_eq!(second.processed, 2);

    let inside = run_batch(
        &engine,
        &dir.path().join("cleared_pdfs"),
        &BatchConfig {
            output_dir: Some(dir.path().join("again")),
            ..BatchConfig::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(inside.processed, 0);
}

#[tokio::test]
async fn test_purge_batch_uses_purged_dir_and_reports_failures() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["good.pdf"]).await;
    tokio::fs::write(dir.path().join("broken.pdf"), b"%PDF-1.7\nnot really").await.unwrap();

    let engine = SanitizationEngine::new(SanitizeConfig {
        mode: Mode::Purge,
        ..SanitizeConfig::default()
    });
    let summary = run_batch(&engine, dir.path(), &BatchConfig::default(), None)
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(dir.path().join("purged_pdfs").join("good.pdf").exists());
    assert!(!dir.path().join("purged_pdfs").join("broken.pdf").exists());

    let printed = summary.to_string();
    assert!(printed.contains("FAILED  broken.pdf"));
    assert!(printed.contains("OK      good.pdf"));

    let report = dir.path().join("summary.json");
    summary.write_json(&report).await.unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&report).await.unwrap()).unwrap();
    assert_eq!(json["failed"], 1);
    assert_eq!(json["outcomes"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_output_dir_equal_to_input_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = BatchConfig {
        output_dir: Some(dir.path().to_path_buf()),
        ..BatchConfig::default()
    };
    let engine = SanitizationEngine::default();
    assert!(run_batch(&engine, dir.path(), &config, None).await.is_err());
}
