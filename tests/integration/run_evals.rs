//! Run-evals driver with scripted backends

use super::test_utils::{openai_credentials, orchestrator, Script, ScriptedFactory};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use shotcode::catalog::{BackendModel, Stack};
use shotcode::evals::{result_set_name, EvalsConfig, RunEvalsDriver};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn eval_dir(inputs: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    let input_dir = dir.path().join("inputs");
    fs::create_dir_all(&input_dir).unwrap();
    for (name, contents) in inputs {
        fs::write(input_dir.join(name), contents.as_bytes()).unwrap();
    }
    dir
}

#[tokio::test]
async fn one_failing_pair_does_not_stop_the_batch() {
    let dir = eval_dir(&[
        ("home.png", "home"),
        ("login.png", "login"),
        ("pricing.png", "pricing"),
    ]);
    let bad_input = format!("data:image/png;base64,{}", STANDARD.encode(b"login"));
    let factory = ScriptedFactory::new()
        .script(
            BackendModel::Gpt4o20241120,
            Script::chunks(["<html>gpt</html>"]),
        )
        .script(
            BackendModel::Gpt4o20240806,
            Script::chunks(["<html>older</html>"]).failing_on_media(bad_input),
        );

    let config = EvalsConfig {
        dir: dir.path().to_path_buf(),
        concurrency: 3,
        outputs_per_case: 1,
    };
    let driver = RunEvalsDriver::new(Arc::new(orchestrator(factory)), config, openai_credentials());
    let report = driver
        .run(
            &[BackendModel::Gpt4o20241120, BackendModel::Gpt4o20240806],
            Stack::HtmlTailwind,
        )
        .await
        .unwrap();

    assert_eq!(report.written.len(), 5);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].case, "login");
    assert_eq!(report.failures[0].backend, BackendModel::Gpt4o20240806);

    for path in &report.written {
        assert!(path.exists(), "{} was not written", path.display());
    }
    let set = dir
        .path()
        .join("results")
        .join(result_set_name(BackendModel::Gpt4o20241120, Stack::HtmlTailwind));
    assert_eq!(
        fs::read_to_string(set.join("home.html")).unwrap(),
        "<html>gpt</html>"
    );
    let failed_set = dir
        .path()
        .join("results")
        .join(result_set_name(BackendModel::Gpt4o20240806, Stack::HtmlTailwind));
    assert!(!failed_set.join("login.html").exists());
}

#[tokio::test]
async fn several_outputs_per_case_are_numbered() {
    let dir = eval_dir(&[("home.png", "home")]);
    let config = EvalsConfig {
        dir: dir.path().to_path_buf(),
        concurrency: 2,
        outputs_per_case: 2,
    };
    let driver = RunEvalsDriver::new(
        Arc::new(orchestrator(ScriptedFactory::new())),
        config,
        openai_credentials(),
    );
    let report = driver
        .run(&[BackendModel::Gpt4o20241120], Stack::HtmlTailwind)
        .await
        .unwrap();

    let names: Vec<String> = report
        .written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["home_0.html".to_string(), "home_1.html".to_string()]);
}
