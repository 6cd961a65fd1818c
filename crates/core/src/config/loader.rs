use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable prefix; nested keys are separated by `__`,
/// e.g. `ANTRIAN_ENGINE__SKIP_POLICY=park`.
pub const ENV_PREFIX: &str = "ANTRIAN_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_config_from_str_bad_value() {
        let toml = r#"
[engine]
skip_policy = "forget"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[[channels]]
id = "anak"
code = "ANK"
name = "Poli Anak"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.channels[0].code, "ANK");
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "antrian.toml",
                r#"
[engine]
skip_policy = "requeue"
"#,
            )?;
            jail.set_env("ANTRIAN_ENGINE__SKIP_POLICY", "park");
            jail.set_env("ANTRIAN_SERVER__PORT", "9090");

            let config = load_config(Path::new("antrian.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.engine.skip_policy, crate::lifecycle::SkipPolicy::Park);
            assert_eq!(config.server.port, 9090);
            Ok(())
        });
    }
}
