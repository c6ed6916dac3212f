//! End-to-end execution with rustc. Skipped when rustc is not on PATH.

mod common;

use common::{line_of, notebook};
use nbimport_core::execute::{Output, Toolchain};
use nbimport_core::{Compiler, Executor, FailurePolicy, RustcConfig, RustcKernel};

fn rustc_available() -> bool {
    if Toolchain::is_available() {
        return true;
    }
    eprintln!("Skipping test: rustc not on PATH");
    false
}

#[test]
fn cells_share_state_and_show_results() {
    if !rustc_available() {
        return;
    }

    let text = notebook(&[
        ("markdown", "# Replay"),
        ("code", "let x = 2;\nprintln!(\"x={x}\");"),
        ("code", "x * 21"),
        ("code", "nbimport::display_html(\"<b>hi</b>\");\neprintln!(\"to stderr\");"),
        ("code", "let unit = ();\nunit"),
    ]);
    let (_, unit) = Compiler::new().compile(text.as_bytes(), "replay.ipynb").unwrap();

    let mut executor = Executor::new(RustcKernel::new().unwrap());
    let records = executor.execute(&unit).unwrap();

    assert_eq!(records.len(), 4);
    assert_eq!(records[0].stdout(), "x=2\n");
    assert_eq!(records[1].stdout(), "");
    assert_eq!(
        records[1].result().and_then(|r| r.plain_text()),
        Some("42")
    );

    let display = records[2].displays().next().unwrap();
    assert_eq!(display.get("text/html").and_then(|v| v.as_str()), Some("<b>hi</b>"));
    assert_eq!(records[2].stderr(), "to stderr\n");

    assert!(records[3].result().is_none());
    assert_eq!(executor.kernel().accepted_cells(), 4);
}

#[test]
fn failures_report_notebook_lines() {
    if !rustc_available() {
        return;
    }

    let text = notebook(&[
        ("code", "let base = 1;"),
        ("code", "let wrong: u32 = \"text\";"),
        ("code", "let missing: Option<i32> = None;\nlet first = missing.unwrap();"),
        ("code", "println!(\"{}\", base + 1);"),
    ]);
    let (_, unit) = Compiler::new().compile(text.as_bytes(), "fail.ipynb").unwrap();

    let mut executor =
        Executor::new(RustcKernel::new().unwrap()).policy(FailurePolicy::ContinueAndRecord);
    let records = executor.execute(&unit).unwrap();

    let compile_error = records[1].error().unwrap();
    assert_eq!(compile_error.ename, "CompileError");
    let wrong_line = line_of(&text, "let wrong");
    assert!(
        compile_error
            .evalue
            .starts_with(&format!("fail.ipynb:{wrong_line}:")),
        "{}",
        compile_error.evalue
    );

    let panic = records[2].error().unwrap();
    assert_eq!(panic.ename, "panic");
    assert!(panic.evalue.contains("on a `None` value"), "{}", panic.evalue);
    let panic_line = line_of(&text, "let first");
    assert!(panic.traceback[0].starts_with(&format!("panicked at fail.ipynb:{panic_line}:")));

    // Failed cells are not replayed.
    assert_eq!(records[3].stdout(), "2\n");
    assert!(!records[3].is_error());
    assert_eq!(executor.kernel().accepted_cells(), 2);
}

#[test]
fn stop_on_error_keeps_partial_records() {
    if !rustc_available() {
        return;
    }

    let text = notebook(&[
        ("code", "println!(\"one\");"),
        ("code", "panic!(\"stop here\");"),
        ("code", "println!(\"never\");"),
    ]);
    let (_, unit) = Compiler::new().compile(text.as_bytes(), "stop.ipynb").unwrap();

    let failure = Executor::new(RustcKernel::new().unwrap())
        .execute(&unit)
        .unwrap_err();
    assert_eq!(failure.error.cell_index, 1);
    assert_eq!(failure.records.len(), 2);
    assert_eq!(failure.records[0].stdout(), "one\n");
    assert!(matches!(
        failure.records[1].outputs.last(),
        Some(Output::Error(e)) if e.evalue == "stop here"
    ));
}

#[test]
fn extra_args_reach_rustc() {
    if !rustc_available() {
        return;
    }

    let config = RustcConfig {
        extra_args: vec!["--cfg".to_string(), "nb_flag".to_string()],
        ..RustcConfig::default()
    };
    let text = notebook(&[(
        "code",
        "#[cfg(nb_flag)]\nprintln!(\"flagged\");\n#[cfg(not(nb_flag))]\nprintln!(\"plain\");",
    )]);
    let (_, unit) = Compiler::new().compile(text.as_bytes(), "cfg.ipynb").unwrap();

    let records = Executor::new(RustcKernel::with_config(config).unwrap())
        .execute(&unit)
        .unwrap();
    assert_eq!(records[0].stdout(), "flagged\n");
}

#[test]
fn shown_values_stay_usable_in_later_cells() {
    if !rustc_available() {
        return;
    }

    let text = notebook(&[
        ("code", "let s = String::from(\"a\");"),
        ("code", "s"),
        ("code", "let v = vec![1, 2];\nv"),
        ("code", "println!(\"{s} {}\", v.len());\ns"),
    ]);
    let (_, unit) = Compiler::new().compile(text.as_bytes(), "borrow.ipynb").unwrap();

    let mut executor =
        Executor::new(RustcKernel::new().unwrap()).policy(FailurePolicy::ContinueAndRecord);
    let records = executor.execute(&unit).unwrap();

    assert!(records.iter().all(|r| !r.is_error()), "{:?}", records);
    assert_eq!(
        records[1].result().and_then(|r| r.plain_text()),
        Some("\"a\"")
    );
    assert_eq!(
        records[2].result().and_then(|r| r.plain_text()),
        Some("[1, 2]")
    );
    assert_eq!(records[3].stdout(), "a 2\n");
    assert_eq!(executor.kernel().accepted_cells(), 4);
}
