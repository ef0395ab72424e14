//! Websocket session loop driven over in-memory channels

use super::test_utils::{openai_credentials, Script, ScriptedFactory, StreamTally};
use futures::channel::mpsc;
use futures::StreamExt;
use shotcode::catalog::BackendModel;
use shotcode::config::AppConfig;
use shotcode::orchestrator::OrchestratorSettings;
use shotcode::protocol::{MessageType, OutboundMessage};
use shotcode::server::{run_session, AppState};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const PARAMS: &str = r#"{
    "generatedCodeConfig": "html_tailwind",
    "image": "data:image/png;base64,AAAA",
    "isImageGenerationEnabled": false
}"#;

fn state(factory: ScriptedFactory) -> AppState {
    let config = AppConfig {
        credentials: openai_credentials(),
        ..Default::default()
    };
    AppState::new(config, Arc::new(factory)).unwrap()
}

fn parse(frames: Vec<String>) -> Vec<OutboundMessage> {
    frames
        .iter()
        .map(|frame| serde_json::from_str(frame).unwrap())
        .collect()
}

#[tokio::test]
async fn every_variant_ends_with_its_code() {
    let state = state(ScriptedFactory::new());
    let (out_tx, out_rx) = mpsc::unbounded::<String>();
    let (in_tx, in_rx) = mpsc::unbounded::<String>();
    in_tx.unbounded_send(PARAMS.to_string()).unwrap();

    run_session(&state, out_tx, in_rx).await;
    drop(in_tx);

    let messages = parse(out_rx.collect().await);
    let mut per_variant: BTreeMap<usize, Vec<OutboundMessage>> = BTreeMap::new();
    for message in messages {
        let index = message.variant_index.expect("variant index on every frame");
        per_variant.entry(index).or_default().push(message);
    }
    assert_eq!(per_variant.len(), 2);
    for (index, messages) in &per_variant {
        let last = messages.last().unwrap();
        assert_eq!(last.kind, MessageType::SetCode, "variant {}", index);
        assert!(last.value.starts_with("<html>"));
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.kind == MessageType::SetCode)
                .count(),
            1
        );
    }
}

#[tokio::test]
async fn invalid_parameters_get_one_connection_level_error() {
    let state = state(ScriptedFactory::new());
    let (out_tx, out_rx) = mpsc::unbounded::<String>();
    let (in_tx, in_rx) = mpsc::unbounded::<String>();
    in_tx
        .unbounded_send(
            r#"{"generatedCodeConfig":"cobol","image":"data:image/png;base64,AAAA"}"#.to_string(),
        )
        .unwrap();

    run_session(&state, out_tx, in_rx).await;

    let messages = parse(out_rx.collect().await);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, MessageType::Error);
    assert_eq!(messages[0].variant_index, None);
    assert!(messages[0].value.contains("cobol"));
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let state = state(ScriptedFactory::new());
    let (out_tx, out_rx) = mpsc::unbounded::<String>();
    let (in_tx, in_rx) = mpsc::unbounded::<String>();
    in_tx
        .unbounded_send(r#"{"generatedCodeConfig":"html_tailwind","colour":"red"}"#.to_string())
        .unwrap();

    run_session(&state, out_tx, in_rx).await;

    let frames: Vec<String> = out_rx.collect().await;
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains(r#""type":"error""#));
    assert!(!frames[0].contains("variantIndex"));
}

#[tokio::test]
async fn client_closing_before_parameters_ends_quietly() {
    let state = state(ScriptedFactory::new());
    let (out_tx, mut out_rx) = mpsc::unbounded::<String>();
    let (in_tx, in_rx) = mpsc::unbounded::<String>();
    drop(in_tx);

    run_session(&state, out_tx, in_rx).await;
    assert_eq!(out_rx.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn closing_the_connection_cancels_generation() {
    let tally = StreamTally::default();
    let slow = Script::chunks(vec!["x"; 20])
        .with_delay(Duration::from_millis(50))
        .with_tally(tally.clone());
    let factory = ScriptedFactory::new()
        .script(BackendModel::Gpt4o20241120, slow.clone())
        .script(BackendModel::O120241217, slow);
    let state = state(factory);
    let (out_tx, mut out_rx) = mpsc::unbounded::<String>();
    let (in_tx, in_rx) = mpsc::unbounded::<String>();
    in_tx.unbounded_send(PARAMS.to_string()).unwrap();

    let session = tokio::spawn({
        let state = state.clone();
        async move { run_session(&state, out_tx, in_rx).await }
    });

    let mut seen = Vec::new();
    while let Some(frame) = out_rx.next().await {
        let message: OutboundMessage = serde_json::from_str(&frame).unwrap();
        let is_chunk = message.kind == MessageType::Chunk;
        seen.push(message);
        if is_chunk {
            break;
        }
    }
    drop(in_tx);
    session.await.unwrap();

    while let Some(frame) = out_rx.next().await {
        seen.push(serde_json::from_str(&frame).unwrap());
    }
    assert!(seen.iter().all(|m| m.kind != MessageType::SetCode));

    let grace = OrchestratorSettings::default().cancel_grace;
    tokio::time::sleep(grace + Duration::from_millis(50)).await;
    assert_eq!(tally.open(), 0);
    let produced = tally.produced();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(tally.produced(), produced);
}
