use regex::Regex;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

struct TestContext {
    _dir: TempDir,
    instance_path: PathBuf,
    out_a: PathBuf,
    out_b: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let instance_path = dir.path().join("strata.txt");

        // 12 units, two auxiliary vectors that cannot both be met exactly
        let mut file = File::create(&instance_path).unwrap();
        writeln!(file, "N 12").unwrap();
        writeln!(file, "n 4").unwrap();
        writeln!(file, "p 2").unwrap();
        writeln!(file, "e 0").unwrap();
        writeln!(file, "k 3").unwrap();
        writeln!(file, "b 200").unwrap();
        writeln!(file, "x").unwrap();
        for i in 0..12 {
            writeln!(file, "{} {}", i % 3 + 1, (i * 5) % 7 + 2).unwrap();
        }

        Self {
            out_a: dir.path().join("a.sol"),
            out_b: dir.path().join("b.sol"),
            _dir: dir,
            instance_path,
        }
    }
}

fn extract_objective(output: &str) -> String {
    let re = Regex::new(r"(?m)^Objective: (\d+\.\d{6})$").unwrap();
    re.captures(output)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "NOT_FOUND".to_string())
}

#[test]
fn test_deterministic_output() {
    let ctx = TestContext::new();
    let bin = env!("CARGO_BIN_EXE_calsample");

    let run = |out: &PathBuf| {
        Command::new(bin)
            .args([
                "search",
                ctx.instance_path.to_str().unwrap(),
                "--seed",
                "12345",
                "-R",
                "2",
                "-o",
                out.to_str().unwrap(),
            ])
            .output()
            .expect("Run failed")
    };

    let output_a = run(&ctx.out_a);
    let output_b = run(&ctx.out_b);

    let stdout_a = String::from_utf8_lossy(&output_a.stdout);
    let stdout_b = String::from_utf8_lossy(&output_b.stdout);

    if !output_a.status.success() {
        println!("STDOUT A:\n{}", stdout_a);
        panic!("Run A failed execution");
    }

    let obj_a = extract_objective(&stdout_a);
    let obj_b = extract_objective(&stdout_b);

    if obj_a != obj_b || obj_a == "NOT_FOUND" {
        println!("--- RUN A ---\n{}", stdout_a);
        println!("--- RUN B ---\n{}", stdout_b);
    }

    assert_eq!(obj_a, obj_b, "Determinism check failed: objectives differ");
    assert_ne!(obj_a, "NOT_FOUND", "Failed to parse objective from output");

    let sol_a = fs::read_to_string(&ctx.out_a).unwrap();
    let sol_b = fs::read_to_string(&ctx.out_b).unwrap();
    assert_eq!(sol_a, sol_b, "Solution files differ");
}
