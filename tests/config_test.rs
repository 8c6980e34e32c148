use std::time::Duration;
use workgroup::Error;
use workgroup::config::Options;

// Environment variables are process-global, so every env scenario lives in
// one test to keep them from racing each other.
#[test]
fn options_from_env() {
    unsafe {
        std::env::set_var("WORKGROUP_WORKERS", "12");
        std::env::set_var("WORKGROUP_NAME", "thumbnails");
        std::env::set_var("WORKGROUP_TIMEOUT_MS", "1500");
        std::env::set_var("WORKGROUP_TIMING", "true");
        std::env::remove_var("WORKGROUP_MONITOR_CAPACITY");
    }

    let options = Options::from_env().unwrap();
    assert_eq!(options.workers, 12);
    assert_eq!(options.name, "thumbnails");
    assert_eq!(options.timeout, Duration::from_millis(1500));
    assert!(options.timing);
    assert_eq!(options.monitor_capacity, 0);

    unsafe {
        std::env::set_var("WORKGROUP_WORKERS", "many");
    }
    let result = Options::from_env();
    assert!(matches!(result, Err(Error::Config(_))));

    unsafe {
        std::env::remove_var("WORKGROUP_WORKERS");
        std::env::remove_var("WORKGROUP_NAME");
        std::env::remove_var("WORKGROUP_TIMEOUT_MS");
        std::env::remove_var("WORKGROUP_TIMING");
    }

    let options = Options::from_env().unwrap();
    assert_eq!(options, Options::default());
}

#[test]
fn options_from_toml() {
    let options = Options::from_toml_str(
        r#"
        [workgroup]
        workers = 6
        name = "ingest"
        timeout_ms = 250
        timing = true
        monitor_capacity = 16
        "#,
    )
    .unwrap();

    assert_eq!(
        options,
        Options::workers(6)
            .name("ingest")
            .timeout(Duration::from_millis(250))
            .timing(true)
            .monitor_capacity(16)
    );
}

#[test]
fn options_from_toml_without_table_are_defaults() {
    let options = Options::from_toml_str("").unwrap();
    assert_eq!(options, Options::default());
}

#[test]
fn options_from_toml_reject_unknown_keys() {
    let result = Options::from_toml_str("[workgroup]\nwokers = 3\n");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn options_load_from_file() {
    let path = std::env::temp_dir().join(format!("workgroup-config-{}.toml", std::process::id()));
    std::fs::write(&path, "[workgroup]\nworkers = 3\n").unwrap();

    let options = Options::load(&path).unwrap();
    assert_eq!(options.workers, 3);

    std::fs::remove_file(&path).unwrap();
    assert!(matches!(Options::load(&path), Err(Error::Io(_))));
}
