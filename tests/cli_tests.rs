use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_calsample");

struct TestContext {
    dir: TempDir,
    instance_path: PathBuf,
}

impl TestContext {
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let instance_path = dir.path().join("pop.txt");

        let mut file = File::create(&instance_path).unwrap();
        writeln!(file, "# six units, one auxiliary vector").unwrap();
        writeln!(file, "N 6").unwrap();
        writeln!(file, "p 1").unwrap();
        write!(file, "{}", body).unwrap();

        Self { dir, instance_path }
    }

    fn path(&self) -> &str {
        self.instance_path.to_str().unwrap()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(BIN)
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("Failed to run calsample")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_validate_prints_the_audit() {
    let ctx = TestContext::new("n 2\nx 1 1 1 1 1 1\n");
    let output = ctx.run(&["validate", ctx.path()]);
    let out = stdout(&output);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(out.contains("INSTANCE AUDIT"));
    assert!(out.contains("Non-zeros"));
    // the auxiliary vector repeats the cardinality row
    assert!(out.contains("linearly dependent"));
}

#[test]
fn test_search_writes_the_solution_file() {
    let ctx = TestContext::new("n 2\nx 1 1 1 1 1 1\ns 42\nk 3\n");
    let output = ctx.run(&["search", ctx.path()]);
    assert!(output.status.success(), "stdout: {}", stdout(&output));

    let sol = ctx.dir.path().join("pop.sol");
    let text = fs::read_to_string(&sol).expect("pop.sol should exist");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "6,1,2,3,4,5,6,1,2,3,4,5,6");
    assert_eq!(lines.len(), 2);

    let fields: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(fields.len(), 13);
    assert_eq!(fields[0], "0");
    let picked = fields[1..7].iter().filter(|f| **f == "1").count();
    assert_eq!(picked, 2);
    for (s, w) in fields[1..7].iter().zip(&fields[7..]) {
        let expected = if *s == "1" { "3" } else { "0" };
        assert_eq!(*w, expected);
    }
}

#[test]
fn test_block_format_and_explicit_output() {
    let ctx = TestContext::new("n 3\nx 2 2 2 2 2 2\n");
    let out_path = ctx.dir.path().join("custom.csv");
    let output = ctx.run(&[
        "search",
        ctx.path(),
        "--seed",
        "3",
        "-R",
        "2",
        "-O",
        "block",
        "-o",
        out_path.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stdout: {}", stdout(&output));

    let text = fs::read_to_string(&out_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "R,F,ID,S,W");
    assert_eq!(lines.len(), 1 + 2 * 6);
    assert!(lines[1].starts_with("1,0,1,"));
    assert!(lines[12].starts_with("2,0,6,"));
    assert!(!ctx.dir.path().join("pop.sol").exists());
}

#[test]
fn test_sample_size_flag_overrides_the_file() {
    let ctx = TestContext::new("n 2\nx 1 1 1 1 1 1\ns 1\n");
    let output = ctx.run(&["search", ctx.path(), "-n", "3", "--dump-settings"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("\"seed\": 1"));
    // dump only: nothing is solved
    assert!(!ctx.dir.path().join("pop.sol").exists());
}

#[test]
fn test_dump_settings_reflects_overrides() {
    let ctx = TestContext::new("n 2\nx 1 1 1 1 1 1\nk 5\nR 4\n");
    let output = ctx.run(&["search", ctx.path(), "-k", "11", "--dump-settings"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("\"rounds\": 11"));
    assert!(out.contains("\"replications\": 4"));
}

#[test]
fn test_bad_algorithm_in_file_fails() {
    let ctx = TestContext::new("n 2\nx 1 1 1 1 1 1\na annealing\n");
    let output = ctx.run(&["search", ctx.path()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("annealing"));
}

#[test]
fn test_bad_sample_size_fails() {
    let ctx = TestContext::new("n 2\nx 1 1 1 1 1 1\n");
    let output = ctx.run(&["search", ctx.path(), "-n", "6"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_missing_instance_fails() {
    let ctx = TestContext::new("n 2\nx 1 1 1 1 1 1\n");
    let missing = ctx.dir.path().join("nope.txt");
    let output = ctx.run(&["validate", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}
