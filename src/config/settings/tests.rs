use super::*;
use tempfile::TempDir;

#[test]
fn default_config_when_file_missing() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let config = Config::load(temp_dir.path()).expect("can load defaults");

    assert_eq!(config.embedder, EmbedderConfig::default());
    assert_eq!(config.embedder.dimension, 768);
    assert_eq!(config.worker.poll_interval_secs, 2);
    assert_eq!(config.worker.seed_likes, 5);
    assert_eq!(config.index.neighbors, 10);
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn save_and_reload_round_trip() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("can load defaults");
    config.embedder.host = "embed-host".to_string();
    config.embedder.port = 9000;
    config.worker.poll_interval_secs = 10;
    config.save().expect("can save config");

    let reloaded = Config::load(temp_dir.path()).expect("can reload config");
    assert_eq!(reloaded.embedder.host, "embed-host");
    assert_eq!(reloaded.embedder.port, 9000);
    assert_eq!(reloaded.worker.poll_interval_secs, 10);
}

#[test]
fn invalid_protocol_rejected() {
    let config = Config {
        embedder: EmbedderConfig {
            protocol: "ftp".to_string(),
            ..EmbedderConfig::default()
        },
        index: IndexConfig::default(),
        worker: WorkerConfig::default(),
        base_dir: std::path::PathBuf::new(),
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));
}

#[test]
fn invalid_dimension_rejected() {
    let config = Config {
        embedder: EmbedderConfig {
            dimension: 10,
            ..EmbedderConfig::default()
        },
        index: IndexConfig::default(),
        worker: WorkerConfig::default(),
        base_dir: std::path::PathBuf::new(),
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidEmbeddingDimension(10))
    ));
}

#[test]
fn zero_capacity_rejected() {
    let config = Config {
        embedder: EmbedderConfig::default(),
        index: IndexConfig {
            capacity: 0,
            neighbors: 10,
        },
        worker: WorkerConfig::default(),
        base_dir: std::path::PathBuf::new(),
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidIndexCapacity(0))
    ));
}

#[test]
fn zero_poll_interval_rejected() {
    let config = Config {
        embedder: EmbedderConfig::default(),
        index: IndexConfig::default(),
        worker: WorkerConfig {
            poll_interval_secs: 0,
            ..WorkerConfig::default()
        },
        base_dir: std::path::PathBuf::new(),
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidPollInterval(0))
    ));
}

#[test]
fn embedder_url_built_from_parts() {
    let embedder = EmbedderConfig {
        host: "example.com".to_string(),
        port: 8080,
        ..EmbedderConfig::default()
    };

    let url = embedder.embedder_url().expect("valid url");
    assert_eq!(url.as_str(), "http://example.com:8080/");
}

#[test]
fn database_path_under_base_dir() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let config = Config::load(temp_dir.path()).expect("can load defaults");

    assert_eq!(config.database_path(), temp_dir.path().join("recs.db"));
}
