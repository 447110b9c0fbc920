use calsample::config::{Algorithm, OutputFormat, RunSettings};
use calsample::instance::{load_instance, parse_instance};
use clap::{CommandFactory, FromArgMatches, Parser};
use std::io::Write;
use tempfile::NamedTempFile;

#[derive(Parser, Debug)]
struct Harness {
    #[command(flatten)]
    settings: RunSettings,
}

fn cli(args: &[&str]) -> (RunSettings, clap::ArgMatches) {
    let matches = Harness::command().try_get_matches_from(args).unwrap();
    let harness = Harness::from_arg_matches(&matches).unwrap();
    (harness.settings, matches)
}

#[test]
fn test_command_line_overrides_file_values() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "N 4\nn 2\np 1\nx 1 2 3 4").unwrap();
    writeln!(file, "k 12\nR 3\na rand\nO block\ns 5").unwrap();

    let mut inst = load_instance(file.path()).unwrap();
    let (args, matches) = cli(&["calsample", "-k", "40", "--algorithm", "global", "-s", "8"]);
    inst.settings.merge_from_cli(&args, &matches);

    assert_eq!(inst.settings.rounds, 40);
    assert_eq!(inst.settings.algorithm, Algorithm::Global);
    assert_eq!(inst.settings.seed, Some(8));
    // untouched on the command line
    assert_eq!(inst.settings.replications, 3);
    assert_eq!(inst.settings.out_format, OutputFormat::Block);
}

#[test]
fn test_clap_defaults_do_not_clobber_the_file() {
    let mut inst = parse_instance("file", "N 4\nn 2\np 0\nk 9\nR 2\n").unwrap();
    let (args, matches) = cli(&["calsample"]);
    inst.settings.merge_from_cli(&args, &matches);
    assert_eq!(inst.settings.rounds, 9);
    assert_eq!(inst.settings.replications, 2);
}

#[test]
fn test_global_runs_a_single_replication() {
    let mut inst = parse_instance("g", "N 4\nn 2\np 0\nR 5\na global\n").unwrap();
    assert!(inst.prepare_run());
    assert_eq!(inst.settings.replications, 1);
    assert_eq!(inst.settings.round_budget(), 1);
    assert_eq!(inst.settings.effective_epsilon(), 0.0);
}

#[test]
fn test_initial_point_kept_only_for_single_random_run() {
    let mut kept = parse_instance("r", "N 4\nn 2\np 0\na rand\ny 1 1 0 0\n").unwrap();
    assert!(kept.prepare_run());
    assert!(kept.initial.is_some());

    let mut dropped = parse_instance("c", "N 4\nn 2\np 0\ny 1 1 0 0\n").unwrap();
    assert!(dropped.prepare_run());
    assert!(dropped.initial.is_none());

    let mut repeated = parse_instance("rr", "N 4\nn 2\np 0\na rand\nR 2\ny 1 1 0 0\n").unwrap();
    assert!(repeated.prepare_run());
    assert!(repeated.initial.is_none());
}

#[test]
fn test_zero_replications_means_nothing_to_do() {
    let mut inst = parse_instance("z", "N 4\nn 2\np 0\nR 0\n").unwrap();
    assert!(!inst.prepare_run());
}

#[test]
fn test_settings_json_carries_file_values() {
    let inst = parse_instance("j", "N 4\nn 2\np 0\ne 0.01\nb 30\n").unwrap();
    let json = inst.settings.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["epsilon"], 0.01);
    assert_eq!(value["node_limit"], 30);
    assert_eq!(value["algorithm"], "cube");
}
