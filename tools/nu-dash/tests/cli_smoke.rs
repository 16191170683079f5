use assert_cmd::cargo::cargo_bin_cmd;

fn fixture(path: &str) -> String {
    format!("{}/tests/fixtures/{path}", env!("CARGO_MANIFEST_DIR"))
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("utf8")
}

#[test]
fn help_lists_flags() {
    let mut cmd = cargo_bin_cmd!("nu-dash");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = stdout_of(out.get_output());

    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--workdir"));
    assert!(stdout.contains("--env"));
}

#[test]
fn piped_stdin_prints_one_report_line_per_task() {
    let mut cmd = cargo_bin_cmd!("nu-dash");
    let temp = tempfile::tempdir().expect("tempdir");
    cmd.arg("--config")
        .arg(fixture("configs/report.yaml"))
        .arg("--workdir")
        .arg(temp.path())
        .write_stdin("");
    let out = cmd.assert().success();
    let lines = stdout_of(out.get_output())
        .lines()
        .map(str::to_string)
        .collect::<Vec<_>>();

    assert_eq!(
        lines,
        vec![
            "task=greeting level=info message=hello",
            "task=shouting level=info message=HELLO",
            "task=threshold level=error message=5",
            "task=broken level=critical message=exit status 1",
        ]
    );
    assert!(temp.path().join(".cache/nu-dash/run.jsonl").exists());
}

#[test]
fn workdir_is_used_for_config_lookup_and_children() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("nu-dash.yaml"),
        "shell: [sh, -c]\ntasks:\n  - name: where\n    command: basename \"$(pwd)\"\n",
    )
    .expect("write config");
    let dir_name = temp
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .expect("dir name")
        .to_string();

    let mut cmd = cargo_bin_cmd!("nu-dash");
    cmd.arg("-w").arg(temp.path()).write_stdin("");
    let out = cmd.assert().success();
    assert_eq!(
        stdout_of(out.get_output()).trim_end(),
        format!("task=where level=info message={dir_name}")
    );
}

#[test]
fn cli_env_overrides_config_env() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("nu-dash");
    cmd.arg("-c")
        .arg(fixture("configs/env.yaml"))
        .arg("-w")
        .arg(temp.path())
        .arg("-e")
        .arg("GREETING=from-cli")
        .env("PLACE", "process")
        .write_stdin("");
    let out = cmd.assert().success();
    assert_eq!(
        stdout_of(out.get_output()).trim_end(),
        "task=greeting level=info message=from-cli config"
    );
}

#[test]
fn missing_config_exits_non_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("nu-dash");
    cmd.arg("--workdir").arg(temp.path()).write_stdin("");
    let out = cmd.assert().code(1);
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.starts_with("nu-dash: "));
    assert!(stderr.contains("nu-dash.yaml"));
}

#[test]
fn malformed_env_flag_exits_non_zero() {
    let mut cmd = cargo_bin_cmd!("nu-dash");
    cmd.arg("--config")
        .arg(fixture("configs/report.yaml"))
        .arg("--env")
        .arg("NOT_AN_ASSIGNMENT")
        .write_stdin("");
    cmd.assert().code(1);
}
