use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/input/topology.json")
}

#[test]
fn renders_svg_from_topology_file() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    assert!(fixture.exists(), "fixture topology should exist");

    let tmp = tempdir()?;
    let output_path = tmp.path().join("topology.svg");

    let mut cmd = Command::cargo_bin("topoview")?;
    cmd.arg("render")
        .arg("--input")
        .arg(&fixture)
        .arg("--output")
        .arg(&output_path)
        .arg("--view")
        .arg("deployment")
        .arg("--cache")
        .arg(tmp.path().join("positions.json"))
        .arg("--duration")
        .arg("0");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Rendered topology"));

    let svg_contents = fs::read_to_string(&output_path)?;
    assert!(
        svg_contents.contains("<svg"),
        "output should contain an <svg> element"
    );
    assert!(svg_contents.contains("cluster:west"));

    Ok(())
}

#[test]
fn animates_from_another_view_to_stdout() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let mut cmd = Command::cargo_bin("topoview")?;
    cmd.arg("render")
        .arg("-i")
        .arg(fixture())
        .arg("-o")
        .arg("-")
        .arg("--from")
        .arg("site")
        .arg("--view")
        .arg("service")
        .arg("--flow")
        .arg("--cache")
        .arg(tmp.path().join("positions.json"))
        .arg("--duration")
        .arg("50");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("service:frontend-&gt;cart"))
        .stdout(predicate::str::contains("East Region").not());

    Ok(())
}

#[test]
fn move_pins_node_for_later_renders() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let cache = tmp.path().join("positions.json");

    Command::cargo_bin("topoview")?
        .arg("move")
        .arg("-i")
        .arg(fixture())
        .arg("--view")
        .arg("service")
        .arg("--node")
        .arg("ledger")
        .arg("--x")
        .arg("12")
        .arg("--y")
        .arg("34")
        .arg("--cache")
        .arg(&cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pinned service 'ledger'"));

    let stored = fs::read_to_string(&cache)?;
    assert!(stored.contains("svc-ledger"));

    Command::cargo_bin("topoview")?
        .arg("render")
        .arg("-i")
        .arg(fixture())
        .arg("-o")
        .arg("-")
        .arg("--cache")
        .arg(&cache)
        .arg("--duration")
        .arg("0")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "<rect x=\"12.0\" y=\"34.0\" width=\"180.0\"",
        ));

    Ok(())
}

#[test]
fn move_rejects_unknown_node() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    Command::cargo_bin("topoview")?
        .arg("move")
        .arg("-i")
        .arg(fixture())
        .arg("--node")
        .arg("nope")
        .arg("--x")
        .arg("1")
        .arg("--y")
        .arg("1")
        .arg("--cache")
        .arg(tmp.path().join("positions.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not part of the service view"));
    Ok(())
}

#[test]
fn missing_input_fails() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("topoview")?
        .arg("render")
        .arg("-i")
        .arg("does-not-exist.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    Ok(())
}

#[cfg(feature = "raster")]
#[test]
fn renders_png() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let output_path = tmp.path().join("topology.png");
    Command::cargo_bin("topoview")?
        .arg("render")
        .arg("-i")
        .arg(fixture())
        .arg("-o")
        .arg(&output_path)
        .arg("--scale")
        .arg("1")
        .arg("--cache")
        .arg(tmp.path().join("positions.json"))
        .arg("--duration")
        .arg("0")
        .arg("-q")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let png = fs::read(&output_path)?;
    assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    Ok(())
}
