//! CLI arg parsing tests for statwatch (client)
use assert_cmd::Command;

fn output_text(out: &std::process::Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

#[test]
fn help_mentions_short_and_long_flags() {
    let out = Command::cargo_bin("statwatch")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = output_text(&out);
    for flag in ["--profile", "-P", "--zoom", "-z", "--dry-run", "--log-file", "--demo"] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn flags_accepted_before_help() {
    for args in [
        &["--profile", "dev", "--help"][..],
        &["-z", "hour", "--help"][..],
        &["--zoom=day", "--save", "--help"][..],
    ] {
        let out = Command::cargo_bin("statwatch")
            .unwrap()
            .args(args)
            .output()
            .unwrap();
        assert!(out.status.success(), "{args:?} did not succeed");
        assert!(output_text(&out).contains("Usage:"));
    }
}

#[test]
fn invalid_zoom_fails() {
    Command::cargo_bin("statwatch")
        .unwrap()
        .args(["--zoom", "fortnight", "ws://127.0.0.1:1/ws"])
        .assert()
        .failure();
}

#[test]
fn dry_run_reports_target_without_connecting() {
    let td = tempfile::tempdir().unwrap();
    let out = Command::cargo_bin("statwatch")
        .unwrap()
        .env("XDG_CONFIG_HOME", td.path())
        .args(["-z", "hour", "--dry-run", "ws://127.0.0.1:1/ws"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = output_text(&out);
    assert!(text.contains("ws://127.0.0.1:1/ws"), "{text}");
    assert!(text.contains("zoom: hour"), "{text}");
}

#[test]
fn demo_dry_run_targets_local_agent() {
    let out = Command::cargo_bin("statwatch")
        .unwrap()
        .args(["--demo", "--dry-run"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(output_text(&out).contains("ws://127.0.0.1:3231/ws"));
}
