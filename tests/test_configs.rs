use figment::Jail;
use std::time::Duration;
use synlogger::loggers::{BackendVariant, Category, DeliveryMode, FrameDelimiter, LoggerBuilder, Severity};
use synlogger::{LoggerSettings, SynError};

#[test]
fn toml_file_with_env_overrides() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "synlog.toml",
            r#"
                server = "graylog.grid.local"
                logger_name = "ttp_1"
                logging_level = "debug"
                censor_keys = ["password"]
                queue_capacity = 64
            "#,
        )?;
        jail.set_env("SYNLOG_LOGGING_LEVEL", "warning");
        jail.set_env("SYNLOG_PORT", "12201");

        let settings = LoggerSettings::load("synlog.toml").expect("settings should load");
        assert_eq!(settings.server.as_deref(), Some("graylog.grid.local"));
        assert_eq!(settings.logger_name, "ttp_1");
        assert_eq!(settings.logging_level, "warning");
        assert_eq!(settings.port, Some(12201));
        assert_eq!(settings.censor_keys, vec!["password".to_string()]);
        assert_eq!(settings.queue_capacity, 64);
        // Untouched keys keep their defaults
        assert_eq!(settings.logging_variant, "graylog");
        assert_eq!(settings.max_retries, 1);
        Ok(())
    });
}

#[test]
fn json_file_is_accepted() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "synlog.json",
            r#"{ "logging_variant": "basic", "delivery_mode": "sync", "frame_delimiter": "newline" }"#,
        )?;

        let settings = LoggerSettings::load("synlog.json").expect("settings should load");
        assert_eq!(settings.logging_variant, "basic");
        assert_eq!(settings.delivery_mode, "sync");
        assert_eq!(settings.frame_delimiter, "newline");
        Ok(())
    });
}

#[test]
fn missing_or_unsupported_files_are_config_errors() {
    Jail::expect_with(|jail| {
        assert!(matches!(LoggerSettings::load("absent.toml"), Err(SynError::ConfigError(_))));

        jail.create_file("synlog.yaml", "logger_name: yaml")?;
        assert!(matches!(LoggerSettings::load("synlog.yaml"), Err(SynError::ConfigError(_))));
        Ok(())
    });
}

#[test]
fn malformed_values_are_config_errors() {
    Jail::expect_with(|jail| {
        jail.set_env("SYNLOG_QUEUE_CAPACITY", "lots");
        assert!(matches!(LoggerSettings::from_env(), Err(SynError::ConfigError(_))));
        Ok(())
    });
}

#[test]
fn env_only_settings_seed_a_builder() {
    Jail::expect_with(|jail| {
        jail.set_env("SYNLOG_LOGGER_NAME", "node_0");
        jail.set_env("SYNLOG_LOGGING_VARIANT", "basic");
        jail.set_env("SYNLOG_LOGGING_LEVEL", "error");
        jail.set_env("SYNLOG_DRAIN_TIMEOUT_MS", "250");

        let settings = LoggerSettings::from_env().expect("env settings");
        assert_eq!(settings.logger_name, "node_0");
        assert!(LoggerBuilder::from_settings(Category::Director, &settings).is_ok());
        Ok(())
    });
}

#[tokio::test]
async fn settings_drive_the_logger_configuration() {
    let settings = LoggerSettings {
        logger_name: "node_0".into(),
        logging_level: "error".into(),
        logging_variant: "basic".into(),
        delivery_mode: "synchronous".into(),
        frame_delimiter: "newline".into(),
        drain_timeout_ms: 250,
        ..LoggerSettings::default()
    };

    let logger = LoggerBuilder::from_settings(Category::Director, &settings)
        .unwrap()
        .initialise()
        .unwrap();
    let config = logger.config();

    assert_eq!(config.logger_name, "DIR_node_0");
    assert_eq!(config.backend_variant, BackendVariant::Console);
    assert_eq!(config.minimum_level, Severity::Error);
    assert_eq!(config.server_port, 9200);
    assert_eq!(config.delivery.mode, DeliveryMode::Synchronous);
    assert_eq!(config.delivery.frame_delimiter, FrameDelimiter::Newline);
    assert_eq!(config.delivery.drain_timeout, Duration::from_millis(250));
    assert_eq!(config.delivery.queue_capacity, 1024);
}

#[test]
fn unknown_enumerations_are_rejected() {
    for (level, mode, delimiter) in [("verbose", "buffered", "null"), ("info", "eventually", "null"), ("info", "buffered", "crlf")] {
        let settings = LoggerSettings {
            logging_level: level.into(),
            delivery_mode: mode.into(),
            frame_delimiter: delimiter.into(),
            ..LoggerSettings::default()
        };
        assert!(matches!(
            LoggerBuilder::from_settings(Category::Worker, &settings),
            Err(SynError::ConfigError(_))
        ));
    }
}
