use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;

const READS: &str = "tests/input/reads.fq";

fn fastq_record_count(output: &[u8]) -> usize {
    String::from_utf8(output.to_vec()).unwrap().lines().count() / 4
}

#[test]
fn cli_no_args() {
    Command::cargo_bin("requal").unwrap().assert().failure();
}

#[test]
fn cli_bad_ksize() {
    Command::cargo_bin("requal")
        .unwrap()
        .args(&["-k", "40", "-g", "200", READS])
        .assert()
        .failure()
        .stderr(contains("InvalidArgument"));
}

#[test]
fn cli_fastq_needs_genomelen() {
    Command::cargo_bin("requal")
        .unwrap()
        .args(&[READS])
        .assert()
        .failure()
        .stderr(contains("InvalidArgument"));
}

#[test]
fn cli_unsupported_format() {
    Command::cargo_bin("requal")
        .unwrap()
        .args(&["-g", "200", "Cargo.toml"])
        .assert()
        .failure()
        .stderr(contains("UnsupportedFormat"));
}

#[test]
fn cli_zero_coverage_is_empty_input() {
    Command::cargo_bin("requal")
        .unwrap()
        .args(&["-g", "100000000", READS])
        .assert()
        .failure()
        .stderr(contains("EmptyInput"));
}

#[test]
fn cli_bad_alpha() {
    Command::cargo_bin("requal")
        .unwrap()
        .args(&["-g", "200", "-a", "1.5", READS])
        .assert()
        .failure()
        .stderr(contains("InvalidArgument"));
}

#[test]
fn cli_recalibrates_fastq() {
    let output = Command::cargo_bin("requal")
        .unwrap()
        .args(&["-vv", "-g", "200", "--seed", "5", READS])
        .unwrap()
        .stdout;
    assert_eq!(fastq_record_count(&output), 40);
    let text = String::from_utf8(output).unwrap();
    assert!(text.starts_with("@readA01"));
    // sequences pass through untouched
    assert!(text.contains("GCTAAAGACAATTACATAACATACACGTC"));
}

#[test]
fn cli_same_seed_same_output() {
    let run = || {
        Command::cargo_bin("requal")
            .unwrap()
            .args(&["-g", "200", "--seed", "17", READS])
            .unwrap()
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn cli_fixed_ground_truth() {
    // the input is its own ground truth: no errors anywhere
    let output = Command::cargo_bin("requal")
        .unwrap()
        .args(&["-f", READS, READS])
        .unwrap()
        .stdout;
    assert_eq!(fastq_record_count(&output), 40);
}
