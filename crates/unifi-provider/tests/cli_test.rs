//! Integration tests for the `unifi-provider` binary.
//!
//! Argument parsing, offline commands and error exit codes run without a
//! controller; the apply round trip runs against a wiremock controller.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with env isolation: no `UNIFI_*` variables and a config
/// directory that does not exist.
fn provider_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("unifi-provider");
    cmd.env("HOME", "/tmp/unifi-provider-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/unifi-provider-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("UNIFI_PROFILE")
        .env_remove("UNIFI_CONFIG")
        .env_remove("UNIFI_CONTROLLER")
        .env_remove("UNIFI_SITE")
        .env_remove("UNIFI_API_KEY")
        .env_remove("UNIFI_OUTPUT")
        .env_remove("UNIFI_INSECURE")
        .env_remove("UNIFI_TIMEOUT")
        .env_remove("UNIFI_PARALLELISM")
        .env_remove("UNIFI_USERNAME")
        .env_remove("UNIFI_PASSWORD");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.display().to_string()
}

const NETWORK_AND_WLAN: &str = r"
network.iot:
  name: iot
  vlan: 20
wlan.iot:
  name: iot-devices
  x_passphrase: correct-horse
  networkconf_id: ${network.iot}
";

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let output = provider_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "{text}");
}

#[test]
fn help_lists_commands() {
    provider_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("plan")
            .and(predicate::str::contains("apply"))
            .and(predicate::str::contains("refresh"))
            .and(predicate::str::contains("schema")),
    );
}

#[test]
fn completions_zsh() {
    provider_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Offline commands ────────────────────────────────────────────────

#[test]
fn schema_lists_every_kind() {
    provider_cmd()
        .args(["schema", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("network")
                .and(predicate::str::contains("firewall_rule"))
                .and(predicate::str::contains("port_forward"))
                .and(predicate::str::contains("user")),
        );
}

#[test]
fn schema_for_one_kind_as_json() {
    provider_cmd()
        .args(["schema", "user", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""identity": "mac""#)
                .and(predicate::str::contains(r#""presence": "computed""#)),
        );
}

#[test]
fn schema_for_unknown_kind_is_a_usage_error() {
    provider_cmd()
        .args(["schema", "vpn_server"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("vpn_server"));
}

#[test]
fn validate_accepts_a_good_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "unifi.yaml", NETWORK_AND_WLAN);

    provider_cmd()
        .args(["validate", "-f", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 resources"));
}

#[test]
fn rule_referencing_a_group_plans_after_it() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "unifi.yaml",
        r#"
firewall_rule.block_cams:
  name: block cams
  ruleset: LAN_IN
  rule_index: 2000
  action: drop
  src_firewallgroup_ids: ["${firewall_group.cams}"]
firewall_group.cams:
  name: cams
  group_type: address-group
  group_members: [10.0.20.0/24]
"#,
    );
    let state = dir.path().join("state.json").display().to_string();

    provider_cmd()
        .args(["validate", "-f", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 resources"));

    let output = provider_cmd()
        .args(["plan", "--no-refresh", "-f", &file, "--state", &state, "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    let group = text.find("firewall_group.cams").unwrap();
    let rule = text.find("firewall_rule.block_cams").unwrap();
    assert!(group < rule, "{text}");
    assert!(!text.contains("${"), "{text}");
}

#[test]
fn validate_rejects_cycles_and_bad_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let cycle = write(
        dir.path(),
        "cycle.yaml",
        r"
network.a:
  name: a
  depends_on: [network.b]
network.b:
  name: b
  depends_on: [network.a]
",
    );
    provider_cmd()
        .args(["validate", "-f", &cycle])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cycle"));

    let unknown = write(dir.path(), "unknown.yaml", "network.a:\n  name: a\n  colour: red\n");
    provider_cmd()
        .args(["validate", "-f", &unknown])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("colour"));
}

#[test]
fn offline_plan_shows_creates() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "unifi.yaml", NETWORK_AND_WLAN);
    let state = dir.path().join("state.json").display().to_string();

    provider_cmd()
        .args(["plan", "--no-refresh", "-f", &file, "--state", &state])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("network.iot")
                .and(predicate::str::contains("(known after apply)"))
                .and(predicate::str::contains("(sensitive)"))
                .and(predicate::str::contains("2 to create")),
        );
}

#[test]
fn plan_without_profile_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "unifi.yaml", NETWORK_AND_WLAN);

    provider_cmd()
        .args(["plan", "-f", &file])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Profile"));
}

#[test]
fn missing_resource_file_is_a_usage_error() {
    provider_cmd()
        .args(["validate", "-f", "/tmp/unifi-provider-test-nonexistent/none.yaml"])
        .assert()
        .code(2);
}

// ── Apply against a controller ──────────────────────────────────────

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "meta": { "rc": "ok" }, "data": data }))
}

#[tokio::test(flavor = "multi_thread")]
async fn apply_creates_and_records_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/s/default/rest/networkconf"))
        .respond_with(ok(json!([{ "_id": "n1", "name": "iot", "vlan": 20 }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/s/default/rest/wlanconf"))
        .and(body_partial_json(json!({ "networkconf_id": "n1" })))
        .respond_with(ok(json!([{
            "_id": "w1", "name": "iot-devices", "networkconf_id": "n1",
            "x_passphrase": "correct-horse"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "unifi.yaml", NETWORK_AND_WLAN);
    let state = dir.path().join("state.json");
    let state_arg = state.display().to_string();
    let uri = server.uri();

    let assert = tokio::task::spawn_blocking(move || {
        provider_cmd()
            .args([
                "apply", "-f", &file, "--state", &state_arg, "--controller", &uri,
                "--api-key", "test-key", "--platform", "classic",
            ])
            .assert()
    })
    .await
    .unwrap();
    assert.success().stdout(predicate::str::contains("2 applied, 0 failed"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&state).unwrap()).unwrap();
    assert_eq!(saved["serial"], 1);
    assert_eq!(saved["records"]["network.iot"]["state"]["key"]["id"], "n1");
    assert_eq!(
        saved["records"]["wlan.iot"]["dependencies"],
        json!(["network.iot"])
    );
}
