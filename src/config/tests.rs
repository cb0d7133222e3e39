use std::collections::HashMap;

use serial_test::serial;

use super::*;

fn serve_args(extra: &[&str]) -> CliArgs {
    let mut argv = vec!["md2pdf", "serve"];
    argv.extend_from_slice(extra);
    CliArgs::parse_from(argv)
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        render: RenderOverrides {
            log_level: Some("debug".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_the_service_contract() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.body_limit_bytes.get(), 200 * 1024 * 1024);
    assert_eq!(settings.server.session_budget, Duration::from_secs(600));
    assert_eq!(settings.server.default_resolution, Resolution::QHD);
    assert_eq!(settings.cli.resolution, Resolution::UHD);
    assert_eq!(settings.cli.session_budget, Duration::from_secs(200));
    assert_eq!(settings.cli.output_dir, PathBuf::from("output"));
    assert!(!settings.render.debug);
    assert!(settings.render.debug_dir().is_none());
    assert!(settings.render.assets_dir.is_absolute());
    assert!(settings.render.work_root().ends_with(WORK_DIR_NAME));
}

#[test]
fn legacy_env_maps_onto_render_settings() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("PORT", "8080"),
        ("MD2PDF_TMP", "/var/tmp/fallback"),
        ("PDF_TMP_DIR", "/var/tmp/primary"),
        ("CHROME_PATH", "/opt/chrome"),
        ("MD2PDF_DEBUG", "1"),
    ]);
    let legacy = LegacyEnv::from_lookup(|key| vars.get(key).map(|value| value.to_string()));

    let mut raw = RawSettings::default();
    raw.apply_legacy_env(&legacy).expect("legacy env applies");
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 8080);
    assert_eq!(settings.render.temp_dir, PathBuf::from("/var/tmp/primary"));
    assert_eq!(settings.render.chrome_path, Some(PathBuf::from("/opt/chrome")));
    assert_eq!(
        settings.render.debug_dir(),
        Some(PathBuf::from("/var/tmp/primary").join(DEBUG_DIR_NAME))
    );
}

#[test]
fn explicit_chrome_env_beats_generic_one() {
    let vars: HashMap<&str, &str> =
        HashMap::from([("MD2PDF_CHROME", "/usr/bin/chromium"), ("CHROME_PATH", "/opt/chrome")]);
    let legacy = LegacyEnv::from_lookup(|key| vars.get(key).map(|value| value.to_string()));
    assert_eq!(legacy.chrome_path.as_deref(), Some("/usr/bin/chromium"));
}

#[test]
fn debug_flag_requires_exactly_one() {
    let legacy = LegacyEnv {
        debug: Some("true".to_string()),
        ..Default::default()
    };
    let mut raw = RawSettings::default();
    raw.apply_legacy_env(&legacy).expect("legacy env applies");
    assert_eq!(raw.render.debug, Some(false));
}

#[test]
fn cli_flags_beat_legacy_env() {
    let legacy = LegacyEnv {
        chrome_path: Some("/opt/chrome".to_string()),
        ..Default::default()
    };
    let args = serve_args(&["--chrome-path", "/usr/local/bin/chrome"]);
    let settings = load_with_env(&args, &legacy).expect("valid settings");
    assert_eq!(
        settings.render.chrome_path,
        Some(PathBuf::from("/usr/local/bin/chrome"))
    );
}

#[test]
fn invalid_legacy_port_is_rejected() {
    let legacy = LegacyEnv {
        port: Some("eighty".to_string()),
        ..Default::default()
    };
    let mut raw = RawSettings::default();
    let err = raw.apply_legacy_env(&legacy).expect_err("port must be numeric");
    assert!(matches!(err, LoadError::Invalid { key: "PORT", .. }));
}

#[test]
fn malformed_resolution_is_rejected() {
    let mut raw = RawSettings::default();
    raw.render.default_resolution = Some("8K".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown preset");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.default_resolution",
            ..
        }
    ));
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut raw = RawSettings::default();
    raw.render.timeouts.diagrams_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        render: RenderOverrides {
            log_json: Some(true),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["md2pdf"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_convert_defaults() {
    let args = CliArgs::parse_from(["md2pdf", "convert"]);
    match args.command.expect("convert command") {
        Command::Convert(convert) => {
            assert_eq!(convert.theme, DEFAULT_CONVERT_THEME);
            assert_eq!(convert.file, PathBuf::from(DEFAULT_CONVERT_FILE));
            assert!(convert.output_dir.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_convert_arguments() {
    let args = CliArgs::parse_from([
        "md2pdf",
        "convert",
        "all",
        "notes/readme.md",
        "--output-dir",
        "/tmp/pdfs",
        "--resolution",
        "1600x900",
    ]);

    let settings = load_with_env(&args, &LegacyEnv::default()).expect("valid settings");
    assert_eq!(settings.cli.output_dir, PathBuf::from("/tmp/pdfs"));
    assert_eq!(settings.cli.resolution, Resolution::new(1600, 900));

    match args.command.expect("convert command") {
        Command::Convert(convert) => {
            assert_eq!(convert.theme, "all");
            assert_eq!(convert.file, PathBuf::from("notes/readme.md"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
#[serial]
fn structured_env_overrides_file_defaults() {
    // SAFETY: serialised with every other test that touches the environment.
    unsafe {
        env::set_var("MD2PDF__SERVER__PORT", "9090");
        env::set_var("MD2PDF__RENDER__TIMEOUTS__MATH_SECONDS", "3");
    }

    let args = serve_args(&[]);
    let result = load_with_env(&args, &LegacyEnv::default());

    unsafe {
        env::remove_var("MD2PDF__SERVER__PORT");
        env::remove_var("MD2PDF__RENDER__TIMEOUTS__MATH_SECONDS");
    }

    let settings = result.expect("valid settings");
    assert_eq!(settings.server.addr.port(), 9090);
    assert_eq!(settings.render.waits.math, Duration::from_secs(3));
}
