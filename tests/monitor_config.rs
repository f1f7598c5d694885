use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use cage_monitor::config::MonitorConfig;
use cage_monitor::detect::{OpenCircuitPolicy, ZoneKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CAGE_MONITOR_CONFIG",
        "CAGE_MONITOR_REMOTE_URL",
        "CAGE_MONITOR_CAMERAS",
        "CAGE_MONITOR_PRIMARY_CAMERA",
        "CAGE_MONITOR_FRAME_STRIDE",
        "CAGE_MONITOR_SENSOR_INTERVAL_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("load defaults");
    assert_eq!(cfg.cameras.len(), 1);
    assert_eq!(cfg.primary().unwrap().url, "stub://cage");
    assert!(cfg.classifier.remote_url.is_none());
    assert_eq!(cfg.pipeline.movement_threshold, 1000);
    assert_eq!(cfg.pipeline.resting_threshold, 5);
    assert_eq!(cfg.pipeline.frame_stride, 3);
    assert_eq!(cfg.pipeline.queue_capacity, 10);
    assert_eq!(cfg.pipeline.failure_threshold, 3);
    assert_eq!(cfg.pipeline.history_capacity, 30);
    assert_eq!(cfg.sensors.interval_ms, 2000);
    assert_eq!(cfg.sensors.retry_attempts, 3);
    assert_eq!(cfg.pipeline.zones.len(), 3);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "cameras": [
            { "id": "top", "url": "stub://top", "width": 800, "height": 600, "fps": 15 }
        ],
        "classifier": {
            "remote_url": "http://10.0.0.5:8081/process_frame",
            "timeout_ms": 1500,
            "open_policy": "local_fallback",
            "probe_every": 4
        },
        "pipeline": {
            "zones": [
                { "kind": "wheel", "x1": 10, "y1": 10, "x2": 300, "y2": 300 },
                { "kind": "food", "x1": 500, "y1": 400, "x2": 700, "y2": 580 }
            ],
            "history_capacity": 60
        },
        "background": { "history": 250 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("CAGE_MONITOR_CONFIG", file.path());
    std::env::set_var("CAGE_MONITOR_FRAME_STRIDE", "5");
    std::env::set_var("CAGE_MONITOR_SENSOR_INTERVAL_MS", "250");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.primary_camera, "top");
    assert_eq!(cfg.cameras[0].width, 800);
    assert_eq!(cfg.cameras[0].fps, 15);
    assert_eq!(
        cfg.classifier.remote_url.as_deref(),
        Some("http://10.0.0.5:8081/process_frame")
    );
    assert_eq!(cfg.classifier.timeout_ms, 1500);
    assert_eq!(cfg.classifier.open_policy, OpenCircuitPolicy::LocalFallback);
    assert_eq!(cfg.classifier.probe_every, 4);
    assert_eq!(cfg.pipeline.zones.len(), 2);
    assert!(cfg.pipeline.zones.iter().any(|z| z.kind == ZoneKind::Food));
    assert_eq!(cfg.pipeline.history_capacity, 60);
    assert_eq!(cfg.pipeline.frame_stride, 5);
    assert_eq!(cfg.background.history, 250);
    assert_eq!(cfg.sensors.interval_ms, 250);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [pipeline]
        movement_threshold = 1500
        queue_capacity = 4

        [sensors]
        retry_attempts = 5
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("CAGE_MONITOR_CONFIG", file.path());

    let cfg = MonitorConfig::load().expect("load config");
    assert_eq!(cfg.pipeline.movement_threshold, 1500);
    assert_eq!(cfg.pipeline.queue_capacity, 4);
    assert_eq!(cfg.sensors.retry_attempts, 5);

    clear_env();
}

#[test]
fn camera_list_from_env_replaces_file_cameras() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAGE_MONITOR_CAMERAS", "stub://a, stub://b");
    std::env::set_var("CAGE_MONITOR_PRIMARY_CAMERA", "cam1");

    let cfg = MonitorConfig::load().expect("load config");
    assert_eq!(cfg.cameras.len(), 2);
    assert_eq!(cfg.cameras[1].url, "stub://b");
    assert_eq!(cfg.primary().unwrap().id, "cam1");

    clear_env();
}

#[test]
fn empty_remote_url_disables_remote() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "classifier": { "remote_url": "http://10.0.0.5:8081/process_frame" } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("CAGE_MONITOR_CONFIG", file.path());
    std::env::set_var("CAGE_MONITOR_REMOTE_URL", "");

    let cfg = MonitorConfig::load().expect("load config");
    assert!(cfg.classifier.remote_url.is_none());

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAGE_MONITOR_FRAME_STRIDE", "0");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("CAGE_MONITOR_FRAME_STRIDE", "three");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("CAGE_MONITOR_REMOTE_URL", "not a url");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("CAGE_MONITOR_PRIMARY_CAMERA", "missing");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "pipeline": { "zones": [ { "kind": "water", "x1": 50, "y1": 50, "x2": 40, "y2": 90 } ] } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("CAGE_MONITOR_CONFIG", file.path());
    assert!(MonitorConfig::load().is_err());

    clear_env();
}
