#[cfg(test)]
pub mod tests {
    use std::path::PathBuf;
    use std::process::{Command, Output};

    const LIVE_LOG: &str = "\
[heaptrace] live table dump
heap: current=2448 max=2448 total=4096 reserved=135168 allocations=3 failed=0
tracker: tracked=2448 peak=0 max_entries=4 entries=3
P: 0x1000 C: 0x4010 S: 24 T: 40
P: 0x2000 C: 0x4020 S: 2400 T: 0
P: 0x3000 C: 0x4010 S: 24 T: 2
[heaptrace] end of dump
";

    const GROWN_LOG: &str = "\
[heaptrace] live table dump
P: 0x1000 C: 0x4010 S: 24 T: 90
P: 0x3000 C: 0x4010 S: 24 T: 52
P: 0x5000 C: 0x4010 S: 24 T: 1
[heaptrace] end of dump
";

    fn run_example(name: &str, feature: &str) -> Output {
        let mut command = Command::new("cargo");
        command.args(["run", "--example", name]);
        if !feature.is_empty() {
            command.args(["--features", feature]);
        }
        command.output().expect("Failed to execute command")
    }

    fn run_cli(args: &[&str]) -> Output {
        Command::new("cargo")
            .args(["run", "--bin", "heaptrace", "--"])
            .args(args)
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to execute command")
    }

    fn write_log(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("heaptrace-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).expect("Failed to write log");
        path
    }

    fn assert_contains(stdout: &str, expected: &[&str]) {
        for expected in expected {
            assert!(
                stdout.contains(expected),
                "Output did not match expected.\nExpected:\n{expected}\n\nGot:\n{stdout}",
            );
        }
    }

    #[test]
    fn test_basic_output() {
        for feature in ["heaptrace", ""] {
            let output = run_example("basic", feature);
            assert!(
                output.status.success(),
                "Process did not exit successfully: {output:?}",
            );

            let stdout = String::from_utf8_lossy(&output.stdout);
            assert_contains(
                &stdout,
                &[
                    "names: 3, leaked: 1200 bytes",
                    "[heaptrace] live table dump",
                    "heap: current=",
                    "tracker: tracked=",
                    "[heaptrace] end of dump",
                ],
            );

            if feature.is_empty() {
                assert_contains(&stdout, &["tracker: tracked=0 peak=0 max_entries=0 entries=0"]);
                assert!(
                    !stdout.contains("P: "),
                    "Untracked build listed allocations:\n{stdout}",
                );
            } else {
                assert_contains(&stdout, &["S: 1200 T: 5"]);
            }
        }
    }

    #[test]
    fn test_threads_output() {
        let output = run_example("threads", "heaptrace");
        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_contains(
            &stdout,
            &["kept 20 chunks", "[heaptrace] live table dump", "[heaptrace] end of dump"],
        );
    }

    #[test]
    fn test_ceiling_dumps_peak_and_aborts() {
        let output = run_example("ceiling", "heaptrace");
        assert!(
            !output.status.success(),
            "Process was expected to abort: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_contains(
            &stdout,
            &[
                "[heaptrace] peak snapshot dump",
                "S: 4096 T: 0",
                "[heaptrace] halt: heap usage of",
                "exceeds the ceiling of 65536 bytes",
            ],
        );
        assert!(!stdout.contains("without hitting the ceiling"));
    }

    #[test]
    fn test_analyze_pipe_output() {
        let log = write_log("analyze-pipe.log", LIVE_LOG);
        let output = run_cli(&["analyze", log.to_str().unwrap(), "--format", "pipe"]);
        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(
            stdout,
            "POINTER|SIZE|TIME|CALLER\n0x1000|24|40|0x4010\n0x2000|2400|0|0x4020\n0x3000|24|2|0x4010\n"
        );
    }

    #[test]
    fn test_analyze_table_output() {
        let log = write_log("analyze-table.log", LIVE_LOG);
        let output = run_cli(&["analyze", log.to_str().unwrap(), "--min-age", "30"]);
        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_contains(
            &stdout,
            &[
                "[heaptrace] live table - 3 allocations, 2.4 KB tracked",
                "0x4020",
                "P99",
                "Leak suspects (age >= 30): 1",
            ],
        );
    }

    #[test]
    fn test_analyze_json_output() {
        let log = write_log("analyze-json.log", LIVE_LOG);
        let output = run_cli(&["analyze", log.to_str().unwrap(), "--format", "json"]);
        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("Output is not valid JSON");
        assert_eq!(json["total_bytes"], 2448);
        assert_eq!(json["callers"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_diff_output() {
        let before = write_log("diff-before.log", LIVE_LOG);
        let after = write_log("diff-after.log", GROWN_LOG);
        let output = run_cli(&[
            "diff",
            "--before",
            before.to_str().unwrap(),
            "--after",
            after.to_str().unwrap(),
            "--format",
            "pipe",
        ]);
        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(
            stdout,
            "CALLER|BEFORE|AFTER|DELTA\n0x4010|48|72|24\n0x4020|2400|0|-2400\n"
        );
    }

    #[test]
    fn test_missing_dumps_is_an_error() {
        let log = write_log("empty.log", "nothing here\n");
        let output = run_cli(&["analyze", log.to_str().unwrap()]);
        assert!(!output.status.success());

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("No heaptrace dumps found"), "{stderr}");
    }
}
