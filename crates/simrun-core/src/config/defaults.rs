//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "simrun.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "simrun.yaml";

/// Directory that may hold the configuration instead of the project root
pub const CONFIG_SUBDIR: &str = ".simrun";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".simrun.toml",
        ".simrun.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# simrun configuration

[project]
executable = "opp_run"
debug_executable = "opp_run_dbg"
ned_path = ["src", "examples"]
libraries = ["src/INET"]
user_interface = "Cmdenv"

[execution]
concurrent = true
shuffle = false

[cache]
enabled = true
artifact = "src/libINET.so"
build_steps = ["make makefiles", "make MODE=release -j"]

[dispatch]
poll_interval_ms = 1000
job_timeout_secs = 3600
job_retention_secs = 604800

[fingerprint]
store = "tests/fingerprint/store.json"
ingredients = ["tplx"]
spec_files = ["tests/fingerprint/*.csv"]
calculator_class = "inet::FingerprintCalculator"
"#;
