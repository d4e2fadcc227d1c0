use std::process::Command;

use tempfile::tempdir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bytesoup"))
}

#[test]
fn run_prints_json_summary() {
    let output = bin()
        .args([
            "run",
            "--runs",
            "3",
            "--seed",
            "7",
            "--width",
            "24",
            "--height",
            "24",
            "--organisms",
            "12",
            "--molecules",
            "40",
            "--json",
        ])
        .output()
        .expect("spawn bytesoup");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    let run = report["summary"]["run"].as_u64().expect("run counter");
    assert!((1..=3).contains(&run));
    assert!(report["stats"]["organisms"].is_u64());
}

#[test]
fn asm_and_disasm_round_trip() {
    let dir = tempdir().expect("tempdir");
    let listing = dir.path().join("listing.txt");
    let code = dir.path().join("code.bin");
    std::fs::write(&listing, "3\nloop\n  inc\nend ;\n").expect("write listing");

    let status = bin()
        .arg("asm")
        .arg(&listing)
        .arg("--output")
        .arg(&code)
        .status()
        .expect("spawn asm");
    assert!(status.success());
    assert_eq!(std::fs::read(&code).expect("read code").len(), 4);

    let output = bin().arg("disasm").arg(&code).output().expect("spawn disasm");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).expect("utf8"),
        "3\nloop\n  inc\nend ;\n"
    );
}

#[test]
fn asm_rejects_unknown_mnemonics() {
    let dir = tempdir().expect("tempdir");
    let listing = dir.path().join("bad.txt");
    std::fs::write(&listing, "inc\nwiggle\n").expect("write listing");
    let output = bin().arg("asm").arg(&listing).output().expect("spawn asm");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("wiggle"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "world_width": 0 }"#).expect("write config");
    let output = bin()
        .args(["run", "--runs", "1", "--config"])
        .arg(&config)
        .output()
        .expect("spawn run");
    assert!(!output.status.success());
}
