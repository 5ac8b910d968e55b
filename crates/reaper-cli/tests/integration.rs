#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

const HOST: &str = "123.dkr.ecr.us-east-1.amazonaws.com";

fn reaper(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reaper").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("REAPER_CONFIG")
        .env_remove("REAPER_INVENTORY")
        .env_remove("DRYRUN")
        .env_remove("IMAGES_TO_KEEP")
        .env_remove("REGION")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// web: v3 (t=3), v2 (t=2), v1 (t=1), in scrambled order.
fn write_inventory(dir: &TempDir) -> PathBuf {
    let body = serde_json::json!({
        "repositories": [{
            "registryId": "123",
            "repositoryName": "web",
            "repositoryUri": format!("{HOST}/web"),
            "images": [
                { "imageDigest": "sha256:two", "imageTags": ["v2"], "imagePushedAt": "2024-01-02T00:00:00Z" },
                { "imageDigest": "sha256:one", "imageTags": ["v1"], "imagePushedAt": "2024-01-01T00:00:00Z" },
                { "imageDigest": "sha256:three", "imageTags": ["v3"], "imagePushedAt": "2024-01-03T00:00:00Z" }
            ]
        }]
    });
    write(dir, "inventory.json", &body.to_string())
}

fn plan_json(dir: &TempDir, args: &[&str]) -> serde_json::Value {
    let output = reaper(dir)
        .args(["plan", "--json", "--inventory", "inventory.json"])
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// reaper plan
// ---------------------------------------------------------------------------

#[test]
fn plan_deletes_oldest_outside_window() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);

    reaper(&dir)
        .args(["plan", "--inventory", "inventory.json", "--keep", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delete image sha256:one"))
        .stdout(predicate::str::contains(format!("delete tag   {HOST}/web:v1")))
        .stdout(predicate::str::contains("sha256:two").not());
}

#[test]
fn plan_json_lists_digests_and_tags() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);

    let plan = plan_json(&dir, &["--keep", "1"]);
    assert_eq!(plan["keep"], 1);
    let web = &plan["repositories"][0];
    assert_eq!(web["repository"], "web");
    assert_eq!(web["digests"], serde_json::json!(["sha256:two", "sha256:one"]));
    assert_eq!(
        web["tag_refs"],
        serde_json::json!([format!("{HOST}/web:v2"), format!("{HOST}/web:v1")])
    );
}

#[test]
fn plan_protects_running_images() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);
    write(&dir, "prod.txt", &format!("# exported from prod\n{HOST}/web:v2\n"));

    let plan = plan_json(&dir, &["--keep", "1", "--active", "prod=prod.txt"]);
    assert_eq!(
        plan["repositories"][0]["digests"],
        serde_json::json!(["sha256:one"])
    );
}

#[test]
fn plan_merges_multiple_scopes() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);
    write(&dir, "dev.txt", &format!("{HOST}/web:v2\n"));
    write(
        &dir,
        "prod.json",
        &serde_json::json!({
            "taskDefinition": { "containerDefinitions": [ { "image": format!("{HOST}/web:v1") } ] }
        })
        .to_string(),
    );

    let plan = plan_json(&dir, &["--keep", "1", "--active", "dev.txt", "--active", "prod.json"]);
    assert_eq!(plan["repositories"], serde_json::json!([]));
}

#[test]
fn keep_from_environment() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);

    reaper(&dir)
        .args(["plan", "--json", "--inventory", "inventory.json"])
        .env("IMAGES_TO_KEEP", "3")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"repositories\": []"));
}

#[test]
fn negative_keep_fails_fast() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);

    reaper(&dir)
        .args(["plan", "--inventory", "inventory.json", "--keep", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid keep count -1"));
}

#[test]
fn missing_inventory_is_an_error() {
    let dir = TempDir::new().unwrap();
    reaper(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no inventory"));
}

#[test]
fn duplicate_digest_in_inventory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let body = serde_json::json!({
        "imageDetails": [
            { "registryId": "123", "repositoryName": "web", "imageDigest": "sha256:a",
              "imageTags": ["v1"], "imagePushedAt": 1700000000 },
            { "registryId": "123", "repositoryName": "web", "imageDigest": "sha256:a",
              "imageTags": ["v2"], "imagePushedAt": 1700000001 }
        ]
    });
    write(&dir, "inventory.json", &body.to_string());

    reaper(&dir)
        .args(["plan", "--inventory", "inventory.json", "--region", "us-east-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate digest sha256:a"));
}

// ---------------------------------------------------------------------------
// reaper run
// ---------------------------------------------------------------------------

#[test]
fn run_is_dry_by_default() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);

    reaper(&dir)
        .args(["run", "--inventory", "inventory.json", "--keep", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delete image sha256:one"))
        .stdout(predicate::str::contains("Dry run: nothing was deleted"));
}

#[test]
fn dryrun_env_needs_explicit_false() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);

    for value in ["yes", "0", "no", "off"] {
        let output = reaper(&dir)
            .args(["run", "--json", "--inventory", "inventory.json", "--keep", "2"])
            .env("DRYRUN", value)
            .output()
            .unwrap();
        assert!(output.status.success(), "DRYRUN={value}");
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["dry_run"], true, "DRYRUN={value}");
        assert_eq!(report["repositories"][0]["deleted"], serde_json::json!([]));
    }
}

#[test]
fn scheduled_run_uses_config_file_only() {
    let dir = TempDir::new().unwrap();
    write_inventory(&dir);
    write(&dir, "prod.txt", &format!("{HOST}/web:v1\n"));
    write(
        &dir,
        "reaper.yaml",
        "keep: 1\ninventory: inventory.json\nactive:\n  - name: prod\n    path: prod.txt\n",
    );

    let output = reaper(&dir).args(["run", "--json"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dry_run"], true);
    assert_eq!(
        report["repositories"][0]["requested"],
        serde_json::json!(["sha256:two"])
    );
}

#[test]
fn live_run_deletes_and_reports_partial_failure() {
    let dir = TempDir::new().unwrap();
    let body = serde_json::json!({
        "repositories": [
            {
                "registryId": "123", "repositoryName": "api", "repositoryUri": format!("{HOST}/api"),
                "images": [
                    { "imageDigest": "sha256:api-new", "imageTags": ["v2"], "imagePushedAt": "2024-01-02T00:00:00Z" },
                    { "imageDigest": "sha256:api-old", "imageTags": ["v1"], "imagePushedAt": "2024-01-01T00:00:00Z" }
                ]
            },
            {
                "registryId": "123", "repositoryName": "web", "repositoryUri": format!("{HOST}/web"),
                "images": [
                    { "imageDigest": "sha256:web-new", "imageTags": ["v2"], "imagePushedAt": "2024-01-02T00:00:00Z" },
                    { "imageDigest": "sha256:web-old", "imagePushedAt": "2024-01-01T00:00:00Z" }
                ]
            }
        ]
    });
    write(&dir, "inventory.json", &body.to_string());

    let mut server = mockito::Server::new();
    let api = server
        .mock("DELETE", "/v2/api/manifests/sha256:api-old")
        .with_status(500)
        .with_body("internal error")
        .create();
    let web = server
        .mock("DELETE", "/v2/web/manifests/sha256:web-old")
        .with_status(202)
        .create();
    write(
        &dir,
        "reaper.yaml",
        &format!("registry:\n  endpoint: {}\n", server.url()),
    );

    let output = reaper(&dir)
        .args([
            "run",
            "--json",
            "--inventory",
            "inventory.json",
            "--keep",
            "1",
            "--dry-run",
            "false",
        ])
        .output()
        .unwrap();

    api.assert();
    web.assert();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 repository failed"));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dry_run"], false);
    assert_eq!(report["repositories"][0]["deleted"], serde_json::json!([]));
    assert_eq!(
        report["repositories"][0]["failures"][0]["digest"],
        "sha256:api-old"
    );
    assert_eq!(
        report["repositories"][1]["deleted"],
        serde_json::json!(["sha256:web-old"])
    );
}

// ---------------------------------------------------------------------------
// reaper active
// ---------------------------------------------------------------------------

#[test]
fn active_prints_deduplicated_ecr_images() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "a.txt",
        &format!("{HOST}/web:v1\nnginx:1.25\n{HOST}/web:v1\n"),
    );
    write(&dir, "b.json", &serde_json::json!([format!("{HOST}/api:v7")]).to_string());

    reaper(&dir)
        .args(["active", "--active", "a.txt", "--active", "b.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{HOST}/web:v1")))
        .stdout(predicate::str::contains(format!("{HOST}/api:v7")))
        .stdout(predicate::str::contains("nginx").not())
        .stdout(predicate::str::contains("2 active image(s) across 2 scope(s)"));
}

// ---------------------------------------------------------------------------
// reaper config
// ---------------------------------------------------------------------------

#[test]
fn config_init_then_validate() {
    let dir = TempDir::new().unwrap();
    reaper(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("reaper.yaml").exists());

    reaper(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    // Defaults only warn (no inventory, no scopes).
    reaper(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[warning]"));
}

#[test]
fn config_validate_rejects_negative_keep() {
    let dir = TempDir::new().unwrap();
    write(&dir, "reaper.yaml", "keep: -5\n");
    reaper(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] keep must be zero or greater"));
}

#[test]
fn config_show_reports_values() {
    let dir = TempDir::new().unwrap();
    write(&dir, "reaper.yaml", "keep: 7\nregion: ap-southeast-2\n");
    reaper(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Keep:       7"))
        .stdout(predicate::str::contains("ap-southeast-2"));
}
