use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result};
use tempfile::tempdir;

const LIFE: &str = r#"{
    "type": "life",
    "commands": [
        {"index": 0, "opcode": "SET_BEHAVIOUR", "args": [2]},
        {"index": 1, "opcode": "IF",
         "condition": {"name": "COL"},
         "operator": {"comparator": "==", "operand": 1}},
        {"index": 2, "opcode": "MESSAGE", "args": [7]},
        {"index": 3, "opcode": "ENDIF"},
        {"index": 4, "opcode": "END"}
    ],
    "behaviourMap": {"2": 0}
}"#;

fn write_fixture(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn lbablocks(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_lbablocks"))
        .args(args)
        .output()
        .context("executing lbablocks")
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().context("fixture path is not valid UTF-8")
}

#[test]
fn tree_output_shows_nested_blocks() -> Result<()> {
    let dir = tempdir().context("creating fixture directory")?;
    let path = write_fixture(dir.path(), "life.json", LIFE)?;

    let out = lbablocks(&["decompile", "file", path_arg(&path)?])?;
    assert!(out.status.success(), "lbablocks exited with {:?}", out.status);

    let stdout = String::from_utf8(out.stdout)?;
    assert!(stdout.starts_with("actor 0\n  life:\n"), "{stdout}");
    assert!(stdout.contains("[0] lba_set_behaviour arg_0=INIT (2@0)"), "{stdout}");
    assert!(stdout.contains("then_statements:"), "{stdout}");
    assert!(stdout.contains("[2] lba_message arg_0=7"), "{stdout}");
    assert!(stdout.contains("[4] END: no extractor, skipped"), "{stdout}");
    Ok(())
}

#[test]
fn json_output_parses() -> Result<()> {
    let dir = tempdir().context("creating fixture directory")?;
    let path = write_fixture(dir.path(), "life.json", LIFE)?;

    let out = lbablocks(&["decompile", "file", path_arg(&path)?, "--mode", "json"])?;
    assert!(out.status.success(), "lbablocks exited with {:?}", out.status);

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).context("parsing JSON output")?;
    let life = &v["actors"][0]["life"];
    assert_eq!(life["kind"], "life");
    assert_eq!(life["scopes_closed"], 1);
    assert_eq!(life["graph"]["roots"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn listing_output_is_one_line_per_command() -> Result<()> {
    let dir = tempdir().context("creating fixture directory")?;
    let path = write_fixture(dir.path(), "life.json", LIFE)?;

    let out = lbablocks(&["decompile", "file", path_arg(&path)?, "--mode", "listing"])?;
    assert!(out.status.success(), "lbablocks exited with {:?}", out.status);

    let stdout = String::from_utf8(out.stdout)?;
    let commands: Vec<&str> = stdout.lines().skip(2).collect();
    assert_eq!(commands.len(), 5);
    assert_eq!(commands[1], "    1  IF COL == 1");
    Ok(())
}

#[test]
fn strict_mode_fails_on_dangling_reference() -> Result<()> {
    let dir = tempdir().context("creating fixture directory")?;
    let path = write_fixture(
        dir.path(),
        "dangling.json",
        r#"{"type": "life", "commands": [{"index": 0, "opcode": "SET_BEHAVIOUR", "args": [9]}]}"#,
    )?;

    let out = lbablocks(&["decompile", "file", path_arg(&path)?, "--strict"])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr)?;
    assert!(stderr.contains("decompile error"), "{stderr}");

    let out = lbablocks(&["decompile", "file", path_arg(&path)?])?;
    assert!(out.status.success());
    Ok(())
}

#[test]
fn invalid_json_is_reported() -> Result<()> {
    let dir = tempdir().context("creating fixture directory")?;
    let path = write_fixture(dir.path(), "broken.json", "{ not json")?;

    let out = lbablocks(&["decompile", "file", path_arg(&path)?])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr)?;
    assert!(stderr.contains("invalid input document"), "{stderr}");
    Ok(())
}

#[test]
fn completion_is_generated() -> Result<()> {
    let out = lbablocks(&["completion", "bash"])?;
    assert!(out.status.success());
    assert!(String::from_utf8(out.stdout)?.contains("lbablocks"));
    Ok(())
}
