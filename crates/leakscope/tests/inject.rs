use std::fs;

use leakscope::inject::{instrument_source, instrumented_path, InjectOutcome};
use leakscope::InjectError;

const TARGET: &str = "\
use std::collections::HashMap;

fn fill(map: &mut HashMap<u32, String>) {
    for i in 0..10 {
        map.insert(i, i.to_string());
    }
}

fn main() {
    let mut map = HashMap::new();
    fill(&mut map);
    if map.is_empty() {
        return;
    }
    println!(\"{} entries\", map.len());
    return;
}
";

fn rewritten(source: &str) -> String {
    match instrument_source(source).expect("instrumentation succeeds") {
        InjectOutcome::Instrumented(text) => text,
        InjectOutcome::AlreadyInstrumented => panic!("unexpected fast path"),
    }
}

#[test]
fn report_calls_land_before_the_final_return_only() {
    let text = rewritten(TARGET);
    let lines: Vec<&str> = text.lines().collect();

    // The nested early return is untouched.
    let early = lines
        .iter()
        .position(|line| line.trim() == "return;")
        .unwrap();
    assert_eq!(lines[early - 1].trim(), "if map.is_empty() {");

    // The three calls sit directly before the top-level return, in order.
    let last = lines
        .iter()
        .rposition(|line| line.trim() == "return;")
        .unwrap();
    assert_eq!(lines[last - 3], "    leakscope::detect_leaks();");
    assert_eq!(lines[last - 2], "    leakscope::print_summary();");
    assert_eq!(lines[last - 1], "    leakscope::generate_html_report();");
}

#[test]
fn preamble_is_prepended_and_original_text_is_preserved() {
    let text = rewritten(TARGET);
    assert!(text.starts_with("// leakscope instrumentation preamble"));
    assert!(text.contains("#[global_allocator]"));

    // Every original line survives the rewrite.
    for line in TARGET.lines() {
        assert!(text.contains(line), "missing line: {line}");
    }
}

#[test]
fn written_copy_round_trips_into_the_fast_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("target.rs");
    fs::write(&target, TARGET).expect("write target");

    let source = fs::read_to_string(&target).expect("read target");
    let copy_path = instrumented_path(&target);
    assert_eq!(
        copy_path.file_name().unwrap().to_str().unwrap(),
        "instrumented_target.rs"
    );
    fs::write(&copy_path, rewritten(&source)).expect("write copy");

    // Instrumenting the copy again changes nothing: the marker short-circuits.
    let copy = fs::read_to_string(&copy_path).expect("read copy");
    assert_eq!(
        instrument_source(&copy).expect("fast path"),
        InjectOutcome::AlreadyInstrumented
    );
}

#[test]
fn sources_without_an_insertion_point_fail_before_any_file_is_written() {
    let no_main = "fn helper() {}\n";
    assert_eq!(
        instrument_source(no_main).unwrap_err(),
        InjectError::NoEntryPoint
    );

    let no_return = "fn main() {\n    println!(\"done\");\n}\n";
    assert_eq!(
        instrument_source(no_return).unwrap_err(),
        InjectError::NoReturnInsertionPoint
    );
}
