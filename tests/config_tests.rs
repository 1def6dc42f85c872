use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

use now_playing_proxy::config::{Config, DEFAULT_API_BASE, DEFAULT_AUTH_BASE};

#[test]
fn config_from_path_parses_toml() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("cfg.toml");
    let mut f = File::create(&cfg_path).unwrap();
    let toml = r#"
client_id = "id"
client_secret = "secret"
refresh_token = "refresh"
bind_addr = "0.0.0.0:8080"
log_dir = "/tmp"
poll_interval_ms = 10000
"#;
    f.write_all(toml.as_bytes()).unwrap();
    let cfg = Config::from_path(&cfg_path).expect("parse config");
    assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_dir.to_str().unwrap(), "/tmp");
    assert_eq!(cfg.poll_interval_ms, 10000);
    assert_eq!(cfg.retry_count, 3);
    assert_eq!(cfg.auth_base, DEFAULT_AUTH_BASE);
    assert_eq!(cfg.api_base, DEFAULT_API_BASE);
    let creds = cfg.credentials().expect("complete credentials");
    assert_eq!(creds.client_id, "id");
}

#[test]
fn empty_file_gives_defaults_without_credentials() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("empty.toml");
    File::create(&cfg_path).unwrap();
    let cfg = Config::from_path(&cfg_path).expect("parse config");
    assert!(cfg.credentials().is_none());
    assert_eq!(cfg.bind_addr, "127.0.0.1:3000");
    assert_eq!(cfg.poll_interval_ms, 5000);
}

#[test]
fn malformed_file_is_an_error() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("bad.toml");
    std::fs::write(&cfg_path, "bind_addr = [").unwrap();
    assert!(Config::from_path(&cfg_path).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let td = tempdir().unwrap();
    assert!(Config::from_path(&td.path().join("nope.toml")).is_err());
}
