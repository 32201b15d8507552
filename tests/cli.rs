//! End-to-end scenarios, transcribed directly from the literal examples
//! in the specification's testable-properties section.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn uniqseq() -> Command {
    Command::cargo_bin("uniqseq").unwrap()
}

fn lines(letters: &str) -> String {
    letters.chars().map(|c| format!("{c}\n")).collect()
}

#[test]
fn scenario_1_short_repeat_is_removed() {
    uniqseq()
        .args(["-w", "3"])
        .write_stdin(lines("ABCDEABC"))
        .assert()
        .success()
        .stdout(lines("ABCDE"));
}

#[test]
fn scenario_2_three_repeats_of_ten_collapse_to_one() {
    let input = "ABCDEFGHIJ".repeat(3);
    uniqseq()
        .args(["-w", "10"])
        .write_stdin(lines(&input))
        .assert()
        .success()
        .stdout(lines("ABCDEFGHIJ"));
}

#[test]
fn scenario_3_exact_repeat_at_window_size_collapses() {
    let input = "ABCDE".repeat(2);
    uniqseq()
        .args(["-w", "5"])
        .write_stdin(lines(&input))
        .assert()
        .success()
        .stdout(lines("ABCDE"));
}

#[test]
fn scenario_3_sequence_shorter_than_window_passes_through() {
    let input = "ABCDE".repeat(2);
    uniqseq()
        .args(["-w", "10"])
        .write_stdin(lines(&input))
        .assert()
        .success()
        .stdout(lines(&input));
}

#[test]
fn scenario_4_no_exact_window_repeat_passes_everything() {
    uniqseq()
        .args(["-w", "3"])
        .write_stdin(lines("ABCBCD"))
        .assert()
        .success()
        .stdout(lines("ABCBCD"));
}

#[test]
fn scenario_5_preloaded_sequence_is_never_emitted() {
    let dir = tempfile::tempdir().unwrap();
    let preload_path = dir.path().join("preload.txt");
    std::fs::write(&preload_path, lines("ABCDEFGHIJ")).unwrap();

    uniqseq()
        .args(["-w", "10", "--preload"])
        .arg(&preload_path)
        .write_stdin(lines("ABCDEFGHIJ"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn scenario_6_bypass_records_do_not_affect_tracked_output() {
    let with_bypass = "+: A\n+: B\n+: C\nnoise one\n+: A\n+: B\n+: C\nnoise two\n";
    let without_bypass = "+: A\n+: B\n+: C\n+: A\n+: B\n+: C\n";

    let out_with_bypass = uniqseq()
        .args(["-w", "3", "-t", "^\\+: "])
        .write_stdin(with_bypass)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let out_without_bypass = uniqseq()
        .args(["-w", "3", "-t", "^\\+: "])
        .write_stdin(without_bypass)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let tracked_only = |out: &[u8]| -> Vec<&str> {
        std::str::from_utf8(out)
            .unwrap()
            .lines()
            .filter(|l| l.starts_with("+: "))
            .collect()
    };
    assert_eq!(tracked_only(&out_with_bypass), tracked_only(&out_without_bypass));
}

#[test]
fn empty_input_produces_empty_output_and_zero_stats() {
    uniqseq()
        .args(["-w", "3"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("0 of 0 records"));
}

#[test]
fn binary_mode_preserves_embedded_nul_bytes() {
    let mut input = Vec::new();
    input.extend_from_slice(b"a\0b\n");
    input.extend_from_slice(b"c\n");

    let mut cmd = uniqseq();
    cmd.args(["-w", "2", "--binary"]);
    let mut child = cmd
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(&input).unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, input);
}

#[test]
fn inverse_mode_emits_only_the_duplicate_window() {
    uniqseq()
        .args(["-w", "3", "--inverse"])
        .write_stdin(lines("ABCDEABC"))
        .assert()
        .success()
        .stdout(lines("ABC"));
}

#[test]
fn library_dir_round_trips_a_discovered_sequence() {
    let dir = tempfile::tempdir().unwrap();
    uniqseq()
        .args(["-w", "3", "--library-dir"])
        .arg(dir.path())
        .write_stdin(lines("ABCDEABC"))
        .assert()
        .success();

    let saved: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("uniqseq"))
        .collect();
    assert_eq!(saved.len(), 1);
}
