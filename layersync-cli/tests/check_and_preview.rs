use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use rusqlite::Connection;
use tempfile::TempDir;

fn layersync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_layersync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("LAYERSYNC_USERNAME")
        .env_remove("LAYERSYNC_PASSWORD");
    cmd
}

fn seed_database(dir: &Path) -> PathBuf {
    let path = dir.join("assets.db");
    let conn = Connection::open(&path).expect("open db");
    conn.execute_batch(
        "CREATE TABLE hydrants (id INTEGER, x REAL, y REAL, status TEXT);
         INSERT INTO hydrants VALUES (10, -122.5, 45.5, 'open');
         INSERT INTO hydrants VALUES (11, -122.6, 45.6, 'closed');
         INSERT INTO hydrants VALUES (12, -122.7, 45.7, 'open');
         CREATE TABLE valves (asset_id TEXT, size INTEGER);
         INSERT INTO valves VALUES ('V-1', 8);",
    )
    .expect("seed db");
    path
}

fn write_config(home: &Path, body: &str) -> PathBuf {
    let path = home.join(".layersync").join("config.yaml");
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, body).expect("write config");
    path
}

fn utilities_config(database: &Path) -> String {
    format!(
        r#"
credentials:
  username: editor
  password: secret
data_source:
  database: {db}
layers:
  - name: hydrants
    admin_url: https://services.test/admin/Utilities/FeatureServer
    layer_url: https://services.test/Utilities/FeatureServer/0
    query: SELECT id, x, y, status FROM hydrants ORDER BY id
    wkid: 4326
    poll_interval_secs: 300
    comparison_mode: GeometryOnly
  - name: valves
    admin_url: https://services.test/admin/Utilities/FeatureServer
    layer_url: https://services.test/Utilities/FeatureServer/1
    query: SELECT asset_id, size FROM valves
    wkid: 4326
    poll_interval_secs: 300
    comparison_mode: NoGeometryAndID
"#,
        db = database.display()
    )
}

#[test]
fn check_lists_layers_and_shared_admin_endpoints() {
    let home = TempDir::new().expect("home");
    let db = seed_database(home.path());
    write_config(home.path(), &utilities_config(&db));

    layersync_cmd(home.path())
        .arg("check")
        .assert()
        .success()
        .stdout(contains("hydrants"))
        .stdout(contains("valves"))
        .stdout(contains(
            "shared admin endpoint https://services.test/admin/Utilities/FeatureServer: hydrants, valves",
        ))
        .stdout(contains("2 layer(s) ready"));
}

#[test]
fn check_fails_on_layer_problems_but_names_them() {
    let home = TempDir::new().expect("home");
    let db = seed_database(home.path());
    let config = utilities_config(&db).replace(
        "query: SELECT asset_id, size FROM valves",
        "query: \"\"",
    );
    write_config(home.path(), &config);

    layersync_cmd(home.path())
        .arg("check")
        .assert()
        .failure()
        .stdout(contains("layer 'valves': query is not configured"))
        .stderr(contains("1 of 2 layer(s) would run"));
}

#[test]
fn check_requires_credentials_unless_supplied_by_environment() {
    let home = TempDir::new().expect("home");
    let db = seed_database(home.path());
    let config = utilities_config(&db).replace("  password: secret\n", "");
    write_config(home.path(), &config);

    layersync_cmd(home.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("password"));

    layersync_cmd(home.path())
        .arg("check")
        .env("LAYERSYNC_PASSWORD", "from-env")
        .assert()
        .success();
}

#[test]
fn check_warns_about_positional_queries_without_order() {
    let home = TempDir::new().expect("home");
    let db = seed_database(home.path());
    let config = utilities_config(&db).replace(" ORDER BY id", "");
    write_config(home.path(), &config);

    layersync_cmd(home.path())
        .arg("check")
        .assert()
        .success()
        .stdout(contains("layer 'hydrants' identifies rows by position"));
}

#[test]
fn check_reports_missing_configuration_file() {
    let home = TempDir::new().expect("home");

    layersync_cmd(home.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"));
}

#[test]
fn preview_prints_first_cycle_adds_with_geometry() {
    let home = TempDir::new().expect("home");
    let db = seed_database(home.path());
    write_config(home.path(), &utilities_config(&db));

    let output = layersync_cmd(home.path())
        .args(["preview", "hydrants", "--limit", "2"])
        .output()
        .expect("run preview");
    assert!(
        output.status.success(),
        "preview failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stderr).contains("3 record(s), showing 2"));

    let features: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("feature JSON");
    let features = features.as_array().expect("array");
    assert_eq!(features.len(), 2);
    assert_eq!(features[0]["geometry"]["x"], -122.5);
    assert_eq!(features[0]["geometry"]["y"], 45.5);
    assert_eq!(features[0]["geometry"]["spatialReference"]["wkid"], 4326);
    assert_eq!(features[1]["attributes"]["status"], "closed");
}

#[test]
fn preview_without_geometry_uses_an_explicit_config_path() {
    let home = TempDir::new().expect("home");
    let elsewhere = TempDir::new().expect("elsewhere");
    let db = seed_database(elsewhere.path());
    let config = elsewhere.path().join("layers.yaml");
    fs::write(&config, utilities_config(&db)).expect("write config");

    let output = layersync_cmd(home.path())
        .args(["preview", "valves", "--config"])
        .arg(&config)
        .output()
        .expect("run preview");
    assert!(output.status.success());

    let features: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("feature JSON");
    assert!(features[0].get("geometry").is_none());
    assert_eq!(features[0]["attributes"]["asset_id"], "V-1");
    assert_eq!(features[0]["attributes"]["size"], 8);
}

#[test]
fn preview_rejects_unknown_layers() {
    let home = TempDir::new().expect("home");
    let db = seed_database(home.path());
    write_config(home.path(), &utilities_config(&db));

    layersync_cmd(home.path())
        .args(["preview", "meters"])
        .assert()
        .failure()
        .stderr(contains("layer 'meters' is not configured"));
}
