use std::path::PathBuf;

use nova_config::{ConfigError, DefaultSuspendPolicy, NovaConfig};
use tempfile::tempdir;

#[test]
fn parses_debugger_section() {
    let config = NovaConfig::load_from_str(
        r#"
[debugger]
breakpoint_store = "/var/lib/nova/breakpoints"
default_suspend_policy = "thread"
save_on_close = false
"#,
    )
    .unwrap();

    assert_eq!(
        config.debugger.breakpoint_store,
        Some(PathBuf::from("/var/lib/nova/breakpoints"))
    );
    assert_eq!(
        config.debugger.default_suspend_policy,
        DefaultSuspendPolicy::Thread
    );
    assert!(!config.debugger.save_on_close);
}

#[test]
fn unknown_debugger_keys_are_rejected() {
    let err = NovaConfig::load_from_str("[debugger]\nsuspend = \"all\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}

#[test]
fn invalid_suspend_policy_is_rejected() {
    let err =
        NovaConfig::load_from_str("[debugger]\ndefault_suspend_policy = \"sometimes\"\n")
            .unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn unreadable_path_reports_io_error() {
    let dir = tempdir().unwrap();
    let err = NovaConfig::load_from_path(dir.path().join("missing.toml")).unwrap_err();
    match err {
        ConfigError::Io { path, .. } => assert!(path.ends_with("missing.toml")),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn logging_level_accepts_directives() {
    let config =
        NovaConfig::load_from_str("[logging]\nlevel = \"info,nova.breakpoints=trace\"\njson = true\n")
            .unwrap();
    assert!(config.logging.json);
    // Building the filter must not fall back to the default.
    let filter = config.logging.env_filter().to_string();
    assert!(filter.contains("nova.breakpoints=trace"), "{filter}");
}

#[test]
fn unknown_top_level_sections_are_rejected() {
    let err = NovaConfig::load_from_str("[debuger]\nsave_on_close = false\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}
