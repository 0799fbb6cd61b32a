use std::process::Command;

fn sieve() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sieve"))
}

#[test]
fn evaluates_single_expression() {
    let out = sieve()
        .args([
            r#"(trait-eq "long" "1")"#,
            "--schema",
            "long LONG",
            "--field",
            "long=1",
        ])
        .output()
        .expect("failed to run sieve");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "true");
}

#[test]
fn evaluates_multiple_expressions_in_order() {
    let out = sieve()
        .args([
            r#"(trait-eq "long" "1")"#,
            r#"(trait-eq "long" "2")"#,
            "--schema",
            "long LONG",
            "--field",
            "long=1",
        ])
        .output()
        .expect("failed to run sieve");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["true", "false"]);
}

#[test]
fn accepts_json_record() {
    let out = sieve()
        .args([
            r#"(trait-contains "strings" "string1")"#,
            "--schema",
            "strings ARRAY<STRING>",
            "--record",
            r#"{"strings": "string1,string2"}"#,
        ])
        .output()
        .expect("failed to run sieve");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "true");
}

#[test]
fn json_output_pairs_expressions_with_results() {
    let out = sieve()
        .args([
            r#"(trait-eq "long" "1")"#,
            "--schema",
            "long LONG",
            "--field",
            "long=1",
            "--json",
        ])
        .output()
        .expect("failed to run sieve");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[0]["result"], serde_json::Value::Bool(true));
}

#[test]
fn dump_prints_program_listing() {
    let out = sieve()
        .args([r#"(trait-eq "long" "1")"#, "--schema", "long LONG", "--dump"])
        .output()
        .expect("failed to run sieve");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("instructions:"), "got: {stdout}");
    assert!(stdout.contains("LongEq"), "got: {stdout}");
    assert!(stdout.contains("Halt"), "got: {stdout}");
}

#[test]
fn compile_errors_exit_nonzero() {
    let out = sieve()
        .args([r#"(trait-frobnicate "x" "y")"#])
        .output()
        .expect("failed to run sieve");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Compile error"), "got: {stderr}");
}

#[test]
fn no_simd_flag_matches_default_results() {
    for extra in [None, Some("--no-simd")] {
        let mut cmd = sieve();
        cmd.args([
            r#"(trait-eq "name" "a-long-enough-value-to-span-lanes")"#,
            "--field",
            "name=a-long-enough-value-to-span-lanes",
        ]);
        if let Some(flag) = extra {
            cmd.arg(flag);
        }
        let out = cmd.output().expect("failed to run sieve");
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "true");
    }
}
