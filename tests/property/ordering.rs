//! Per-variant ordering holds for any mix of chunk timings and failures

use super::support::{by_variant, image_request, openai_credentials, orchestrator, Script, ScriptedFactory};
use proptest::prelude::*;
use shotcode::catalog::BackendModel;
use shotcode::worker::WorkerEvent;
use std::time::Duration;

fn script() -> impl Strategy<Value = Script> {
    (
        prop::collection::vec("[a-z]{1,5}", 0..6),
        0u64..30,
        prop::option::of(0usize..6),
        prop::bool::weighted(0.15),
    )
        .prop_map(|(chunks, delay_ms, fail_at, fail_start)| Script {
            chunks,
            delay: Duration::from_millis(delay_ms),
            fail_at,
            fail_start,
            ..Default::default()
        })
}

fn check_variant(script: &Script, events: &[WorkerEvent]) -> Result<(), TestCaseError> {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    prop_assert_eq!(terminals, 1);
    prop_assert!(events.last().is_some_and(WorkerEvent::is_terminal));

    let chunks: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::Chunk(text) if !text.is_empty() => Some(text),
            _ => None,
        })
        .collect();
    let failing_chunk = script.fail_at.filter(|at| *at < script.chunks.len());

    if script.fail_start {
        prop_assert!(chunks.is_empty());
        prop_assert!(matches!(events.last(), Some(WorkerEvent::Error(_))));
    } else if let Some(at) = failing_chunk {
        let expected: Vec<&String> = script.chunks[..at].iter().collect();
        prop_assert_eq!(chunks, expected);
        prop_assert!(matches!(events.last(), Some(WorkerEvent::Error(_))));
    } else {
        let expected: Vec<&String> = script.chunks.iter().collect();
        prop_assert_eq!(chunks, expected);
        prop_assert!(matches!(events.last(), Some(WorkerEvent::Complete(_))));
    }
    Ok(())
}

/// Chunks keep backend order and exactly one terminal event closes each variant
#[test]
fn test_per_variant_ordering() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(script(), script()), |(first, second)| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let factory = ScriptedFactory::new()
                .script(BackendModel::Gpt4o20241120, first.clone())
                .script(BackendModel::O120241217, second.clone());
            let events = runtime.block_on(async move {
                let orchestrator = orchestrator(factory);
                let mut stream = orchestrator.start(image_request(openai_credentials())).unwrap();
                let mut events = Vec::new();
                while let Some(event) = stream.recv().await {
                    events.push(event);
                }
                events
            });

            let grouped = by_variant(&events);
            prop_assert_eq!(grouped.len(), 2);
            check_variant(&first, &grouped[&0])?;
            check_variant(&second, &grouped[&1])?;
            Ok(())
        })
        .unwrap();
}
