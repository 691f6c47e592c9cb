use assert_cmd::prelude::*;
use std::{fs, process::Command};
use tempfile::TempDir;

fn write_env(dir: &TempDir, content: &str) -> String {
    let env_path = dir.path().join("env");
    fs::write(&env_path, content).unwrap();
    env_path.to_str().unwrap().to_string()
}

fn relaydeck() -> Command {
    let mut cmd = Command::cargo_bin("relaydeck").unwrap();
    for var in [
        "RELAY_URL",
        "SECRET_KEY",
        "TOR_SOCKS",
        "FEED_KINDS",
        "FEED_AUTHORS",
        "FEED_LIMIT",
        "VERIFY_SIG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn cli_help_lists_commands() {
    let output = relaydeck()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    for cmd in [
        "init", "use", "whoami", "info", "cors", "events", "methods", "call", "pubkey", "event",
        "kind", "ip", "relay",
    ] {
        assert!(text.contains(cmd), "missing {cmd}");
    }
    assert!(text.contains("--relay"));
}

#[test]
fn cli_help_subcommand_still_works() {
    let output = relaydeck()
        .args(["help", "pubkey"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("ban"));
    assert!(text.contains("banned"));
}

#[test]
fn init_writes_default_env() {
    let dir = TempDir::new().unwrap();
    let env_path = dir.path().join("deck.env");
    relaydeck()
        .args(["--env", env_path.to_str().unwrap(), "init"])
        .assert()
        .success();
    let data = fs::read_to_string(&env_path).unwrap();
    for key in ["RELAY_URL=", "SECRET_KEY=", "TOR_SOCKS=", "FEED_KINDS=1", "VERIFY_SIG=0"] {
        assert!(data.contains(key), "missing {key}");
    }
}

#[test]
fn use_then_whoami() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, &format!("SECRET_KEY={}\n", "01".repeat(32)));
    relaydeck()
        .args(["--env", &env_path, "use", "wss://relay.example"])
        .assert()
        .success();
    assert!(fs::read_to_string(&env_path)
        .unwrap()
        .contains("RELAY_URL=wss://relay.example"));

    let output = relaydeck()
        .args(["--env", &env_path, "whoami"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let pubkey = String::from_utf8(output).unwrap();
    assert_eq!(pubkey.trim().len(), 64);
}

#[test]
fn invalid_pubkey_is_rejected_before_sending() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, &format!("SECRET_KEY={}\n", "01".repeat(32)));
    // Port 9 is never contacted because validation fails first.
    let output = relaydeck()
        .args([
            "--env",
            &env_path,
            "--relay",
            "ws://127.0.0.1:9",
            "pubkey",
            "ban",
            "not-a-pubkey",
        ])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8(output).unwrap().contains("invalid input"));
}

#[test]
fn whoami_without_key_fails() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, "SECRET_KEY=\n");
    let output = relaydeck()
        .args(["--env", &env_path, "whoami"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8(output).unwrap().contains("signer not found"));
}
