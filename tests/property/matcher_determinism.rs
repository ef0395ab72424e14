//! Matcher results depend only on directory contents

use proptest::prelude::*;
use shotcode::evals::{compare_sets, list_single, matches_base};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_set(root: &Path, name: &str, stems: &[String]) -> PathBuf {
    let set = root.join(name);
    fs::create_dir_all(&set).unwrap();
    for stem in stems {
        fs::write(set.join(format!("{}.html", stem)), stem.as_bytes()).unwrap();
    }
    set
}

fn layout() -> impl Strategy<Value = (BTreeSet<String>, Vec<String>, Vec<String>)> {
    let output = "[a-c]{1,3}(_[a-z0-9]{1,2})?";
    (
        prop::collection::btree_set("[a-c]{1,3}", 1..5),
        prop::collection::vec(output, 0..8),
        prop::collection::vec(output, 0..8),
    )
}

/// Listing and comparing twice over the same tree gives the same sorted answer
#[test]
fn test_matcher_is_deterministic() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&layout(), |(inputs, first, second)| {
            let dir = TempDir::new().unwrap();
            let input_dir = dir.path().join("inputs");
            fs::create_dir_all(&input_dir).unwrap();
            for stem in &inputs {
                fs::write(input_dir.join(format!("{}.png", stem)), b"\x89PNG").unwrap();
            }
            let sets = [
                write_set(dir.path(), "first", &first),
                write_set(dir.path(), "second", &second),
            ];

            let single_a = list_single(&input_dir, &sets[0]).unwrap();
            let single_b = list_single(&input_dir, &sets[0]).unwrap();
            prop_assert_eq!(&single_a, &single_b);

            let compared_a = compare_sets(&input_dir, &sets).unwrap();
            let compared_b = compare_sets(&input_dir, &sets).unwrap();
            prop_assert_eq!(&compared_a, &compared_b);

            let bases: Vec<&String> = compared_a.cases.iter().map(|c| &c.base_name).collect();
            let mut sorted = bases.clone();
            sorted.sort();
            prop_assert_eq!(bases, sorted);

            // Every input lands in exactly one of cases or skipped
            prop_assert_eq!(
                compared_a.cases.len() + compared_a.skipped.len(),
                inputs.len()
            );

            for case in &single_a {
                let mut outputs = case.outputs.clone();
                outputs.sort();
                prop_assert_eq!(&outputs, &case.outputs);
                for output in &case.outputs {
                    let stem = output.file_stem().unwrap().to_string_lossy();
                    prop_assert!(matches_base(&stem, &case.base_name));
                }
            }
            Ok(())
        })
        .unwrap();
}
