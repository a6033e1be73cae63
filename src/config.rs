//! Configuration management

use std::{collections::BTreeMap, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::allow::AllowSpec;
use crate::{Error, Result};

/// Gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Environment files to load before `${VAR}` expansion.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Allowed message shapes. Absent disables enforcement.
    pub allow: Option<BTreeMap<String, AllowSpec>>,
    /// Base object of the `custom` hook fold
    pub custom: Map<String, Value>,
    /// Base object of the `fixed` hook fold
    pub fixed: Map<String, Value>,
    /// Client timeout negotiation
    pub timeout: TimeoutConfig,
    /// Error disclosure
    pub error: ErrorConfig,
    /// Diagnostics
    pub debug: DebugConfig,
}

/// Client timeout negotiation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Honour `timeout$` on inbound requests
    pub client: bool,
    /// Largest accepted `timeout$` in milliseconds; non-positive means the
    /// runtime default
    pub max: i64,
}

impl TimeoutConfig {
    /// Largest timeout a client may request.
    #[must_use]
    pub fn cap(&self, runtime_default: Duration) -> Duration {
        u64::try_from(self.max)
            .ok()
            .filter(|max| *max > 0)
            .map_or(runtime_default, Duration::from_millis)
    }
}

/// What a failure envelope may disclose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorConfig {
    /// Include the error message
    pub message: bool,
    /// Include the error details
    pub details: bool,
}

/// Diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Include stack traces, full trace metadata and allow-list decisions in
    /// responses
    pub response: bool,
    /// Log every pipeline stage
    pub log: bool,
}

impl GatewayConfig {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // MSG_GATEWAY_DEBUG__RESPONSE=true -> debug.response
        figment = figment.merge(Env::prefixed("MSG_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Parse configuration from a YAML document, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.expand_env_vars()?;
        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` in the string values of
    /// `custom` and `fixed`
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        for value in self.custom.values_mut().chain(self.fixed.values_mut()) {
            expand_value(&re, value);
        }
        Ok(())
    }
}

fn expand_value(re: &Regex, value: &mut Value) {
    match value {
        Value::String(s) => {
            if re.is_match(s) {
                *s = expand_string(re, s);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| expand_value(re, v)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_value(re, v)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn defaults_disable_everything() {
        let config = GatewayConfig::default();
        assert!(config.allow.is_none());
        assert!(!config.timeout.client);
        assert!(!config.error.message && !config.error.details);
        assert!(!config.debug.response && !config.debug.log);
    }

    #[test]
    fn full_document_from_yaml() {
        let yaml = r#"
allow:
  "foo:1":
    - "a:2"
    - { b: 3, c: 4 }
  "bar:1": true
custom:
  tenant: acme
fixed:
  role: user
timeout:
  client: true
  max: 5000
error:
  message: true
debug:
  response: true
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        let allow = config.allow.unwrap();
        assert_eq!(allow["bar:1"], AllowSpec::Flag(true));
        assert_eq!(
            allow["foo:1"],
            AllowSpec::Params(vec![json!("a:2"), json!({"b": 3, "c": 4})])
        );
        assert_eq!(Value::Object(config.custom), json!({"tenant": "acme"}));
        assert_eq!(Value::Object(config.fixed), json!({"role": "user"}));
        assert_eq!(config.timeout, TimeoutConfig { client: true, max: 5000 });
        assert!(config.error.message);
        assert!(!config.error.details);
        assert!(config.debug.response);
        assert!(!config.debug.log);
    }

    #[test]
    fn empty_allow_section_enables_enforcement() {
        let config = GatewayConfig::from_yaml("allow: {}\n").unwrap();
        assert_eq!(config.allow, Some(BTreeMap::new()));
    }

    #[test]
    fn timeout_cap_falls_back_to_runtime_default() {
        let default = Duration::from_millis(22_222);
        for max in [0, -1] {
            let cfg = TimeoutConfig { client: true, max };
            assert_eq!(cfg.cap(default), default);
        }
        let cfg = TimeoutConfig { client: true, max: 100 };
        assert_eq!(cfg.cap(default), Duration::from_millis(100));
    }

    #[test]
    fn expands_env_vars_in_custom_and_fixed() {
        let yaml = r#"
custom:
  region: "${MSG_GW_TEST_UNSET_REGION:-eu-west}"
  nested:
    - "${MSG_GW_TEST_UNSET_LIST}"
fixed:
  path: "$HOME is not expanded"
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            Value::Object(config.custom),
            json!({"region": "eu-west", "nested": [""]})
        );
        assert_eq!(config.fixed["path"], json!("$HOME is not expanded"));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "allow:\n  'sys:user': true\nerror:\n  details: true").unwrap();
        drop(f);

        let config = GatewayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.allow.unwrap().len(), 1);
        assert!(config.error.details);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = GatewayConfig::load(Some(Path::new("/nonexistent/gateway.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn env_files_are_loaded_before_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("gateway.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "MSG_GW_TEST_TENANT=from_env_file").unwrap();
        drop(f);

        let path = dir.path().join("gateway.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "env_files:\n  - {}\ncustom:\n  tenant: \"${{MSG_GW_TEST_TENANT}}\"",
            env_path.display()
        )
        .unwrap();
        drop(f);

        let config = GatewayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.custom["tenant"], json!("from_env_file"));
    }

    #[test]
    fn env_files_skip_missing() {
        let config = GatewayConfig {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }
}
