//! Property-based checks for the conservation, ordering, determinism and
//! round-trip laws that must hold for any input stream, not just the
//! literal fixtures in `cli.rs`.

use std::collections::HashSet;

use assert_cmd::Command;
use proptest::prelude::*;

fn uniqseq() -> Command {
    Command::cargo_bin("uniqseq").unwrap()
}

fn run(window_size: usize, extra_args: &[&str], input: &str) -> (Vec<u8>, Vec<u8>) {
    let mut cmd = uniqseq();
    cmd.args(["-w", &window_size.to_string()]);
    cmd.args(extra_args);
    let assert = cmd.write_stdin(input).assert().success();
    let output = assert.get_output();
    (output.stdout.clone(), output.stderr.clone())
}

fn records_of(s: &str) -> Vec<&str> {
    s.lines().collect()
}

/// Tokens drawn from a small alphabet so windows actually repeat across a
/// reasonably short generated stream, without ever containing the record
/// delimiter or filter-sensitive characters.
fn arb_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("alpha".to_string()),
        Just("bravo".to_string()),
        Just("charlie".to_string()),
        Just("delta".to_string()),
        Just("echo".to_string()),
    ]
}

fn arb_stream() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_token(), 0..40)
}

proptest! {
    /// Invariant 1 (Conservation): total_input == emitted + skipped for an
    /// input with no bypassed records.
    #[test]
    fn conservation_holds(tokens in arb_stream(), window_size in 1usize..6) {
        let input: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let (stdout, stderr) = run(window_size, &[], &input);
        let emitted = records_of(std::str::from_utf8(&stdout).unwrap()).len() as u64;
        let stderr_text = std::str::from_utf8(&stderr).unwrap();
        let total = tokens.len() as u64;

        // "<emitted> of <total> records emitted, <skipped> skipped as duplicates"
        let skipped = total - emitted;
        prop_assert!(stderr_text.contains(&format!("{emitted} of {total} records emitted, {skipped} skipped")));
    }

    /// Invariant 2 (Order): the emitted tracked records form a subsequence
    /// of the input in original order.
    #[test]
    fn emitted_output_is_a_subsequence_of_input(tokens in arb_stream(), window_size in 1usize..6) {
        let input: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let (stdout, _) = run(window_size, &[], &input);
        let output_lines = records_of(std::str::from_utf8(&stdout).unwrap());

        let mut cursor = 0usize;
        for out_line in &output_lines {
            while cursor < tokens.len() && tokens[cursor] != *out_line {
                cursor += 1;
            }
            prop_assert!(cursor < tokens.len(), "output line {} not found in remaining input", out_line);
            cursor += 1;
        }
    }

    /// Invariant 3: the first occurrence of any record is always emitted
    /// (no preloads in play here).
    #[test]
    fn first_occurrence_of_every_record_survives(tokens in arb_stream(), window_size in 1usize..6) {
        let input: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let (stdout, _) = run(window_size, &[], &input);
        let output_lines: HashSet<&str> = records_of(std::str::from_utf8(&stdout).unwrap()).into_iter().collect();

        let mut seen = HashSet::new();
        for t in &tokens {
            if seen.insert(t.clone()) {
                prop_assert!(output_lines.contains(t.as_str()), "first occurrence of {t} missing from output");
            }
        }
    }

    /// Invariant 5 (Determinism): running the same input twice yields
    /// identical output.
    #[test]
    fn identical_input_yields_identical_output(tokens in arb_stream(), window_size in 1usize..6) {
        let input: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let (stdout_a, _) = run(window_size, &[], &input);
        let (stdout_b, _) = run(window_size, &[], &input);
        prop_assert_eq!(stdout_a, stdout_b);
    }

    /// Round-trip law: idempotence. Feeding a normal-mode run's output back
    /// through the engine with the same window size changes nothing further,
    /// since by construction it no longer contains any repeated W-window.
    #[test]
    fn rerunning_deduped_output_is_a_no_op(tokens in arb_stream(), window_size in 1usize..6) {
        let input: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let (stdout, _) = run(window_size, &[], &input);
        let first_pass = String::from_utf8(stdout).unwrap();
        let (stdout_again, _) = run(window_size, &[], &first_pass);
        prop_assert_eq!(String::from_utf8(stdout_again).unwrap(), first_pass);
    }

    /// Round-trip law: inverse complementarity. Merging the normal-mode
    /// output with the inverse-mode output (as multisets) reproduces the
    /// tracked input (as a multiset); every tracked record appears in
    /// exactly one of the two outputs.
    #[test]
    fn normal_and_inverse_outputs_partition_the_input(tokens in arb_stream(), window_size in 1usize..6) {
        let input: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let (normal_out, _) = run(window_size, &[], &input);
        let (inverse_out, _) = run(window_size, &["--inverse"], &input);

        let mut combined: Vec<&str> = Vec::new();
        combined.extend(records_of(std::str::from_utf8(&normal_out).unwrap()));
        combined.extend(records_of(std::str::from_utf8(&inverse_out).unwrap()));
        combined.sort_unstable();

        let mut expected: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
        expected.sort_unstable();

        prop_assert_eq!(combined, expected);
    }

    /// Invariant 4 (Bounded memory): a tiny `max_unique_sequences` cap never
    /// causes the process to fail, even on inputs that would otherwise
    /// record many distinct sequences.
    #[test]
    fn tiny_library_cap_never_fails(tokens in arb_stream(), window_size in 1usize..6) {
        let input: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        let (_stdout, _stderr) = run(window_size, &["--max-unique-sequences", "1"], &input);
    }

    /// Invariant 6 (Tracked/bypass separation): interleaving arbitrary
    /// bypassed "noise" records between tracked records never changes the
    /// order or identity of the tracked records that come out the other
    /// side.
    #[test]
    fn bypassed_noise_does_not_affect_tracked_output(tokens in arb_stream(), window_size in 1usize..6) {
        let tracked_input: String = tokens.iter().map(|t| format!("+{t}\n")).collect();
        let with_noise: String = tokens.iter().map(|t| format!("+{t}\nnoise\n")).collect();

        let (tracked_out, _) = run(window_size, &["-t", "^\\+"], &tracked_input);
        let (noisy_out, _) = run(window_size, &["-t", "^\\+"], &with_noise);

        let only_tracked = |bytes: &[u8]| -> Vec<String> {
            records_of(std::str::from_utf8(bytes).unwrap())
                .into_iter()
                .filter(|l| l.starts_with('+'))
                .map(|l| l.to_string())
                .collect()
        };
        prop_assert_eq!(only_tracked(&tracked_out), only_tracked(&noisy_out));
    }
}
