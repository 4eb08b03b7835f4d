// core/src/infrastructure/config.rs
//
// `DeployConfig`: loaded from a YAML file, with a handful of fields
// overridable by environment variable or CLI flag: a single-file load plus
// an explicit env overlay for the one override this layer needs
// (`SCHEMACHANGE_OUT_OF_ORDER`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::infrastructure::error::InfrastructureError;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    pub root_folder: PathBuf,
    #[serde(default)]
    pub modules_folder: Option<PathBuf>,
    #[serde(default)]
    pub config_vars: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub dry_run: bool,
    /// Three-state: absent means "not set", distinct from an explicit
    /// `false`.
    #[serde(default)]
    pub out_of_order: Option<bool>,
    #[serde(default = "default_true")]
    pub create_change_history_table: bool,
    #[serde(default)]
    pub raise_exception_on_ignored_versioned_script: bool,
    #[serde(default)]
    pub continue_versioned_on_error: bool,
    #[serde(default)]
    pub continue_repeatable_on_error: bool,
    #[serde(default)]
    pub continue_always_on_error: bool,
    #[serde(default)]
    pub version_number_validation_regex: Option<String>,
}

impl DeployConfig {
    /// A config built from flags alone, for the case where no
    /// `schemachange-config.yml` is present. Still subject to the same
    /// env-override pass as a file-loaded config.
    pub fn with_root_folder(root_folder: PathBuf) -> Self {
        let mut config = DeployConfig {
            root_folder,
            modules_folder: None,
            config_vars: HashMap::new(),
            dry_run: false,
            out_of_order: None,
            create_change_history_table: true,
            raise_exception_on_ignored_versioned_script: false,
            continue_versioned_on_error: false,
            continue_repeatable_on_error: false,
            continue_always_on_error: false,
            version_number_validation_regex: None,
        };
        config.apply_env_overrides();
        config
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, InfrastructureError> {
        let mut config: DeployConfig = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, InfrastructureError> {
        if !path.exists() {
            return Err(InfrastructureError::ConfigNotFound(
                path.display().to_string(),
            ));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Look for a config file under one of the conventional names in
    /// `config_folder`. `None` when neither name is present: the caller
    /// (the CLI) falls back to flag-only configuration.
    pub fn discover(config_folder: &Path) -> Result<Option<Self>, InfrastructureError> {
        const CANDIDATES: &[&str] = &["schemachange-config.yml", "schemachange.yml"];
        for name in CANDIDATES {
            let candidate = config_folder.join(name);
            if candidate.exists() {
                return Self::from_yaml_file(&candidate).map(Some);
            }
        }
        Ok(None)
    }

    /// `SCHEMACHANGE_OUT_OF_ORDER` overrides the config file's
    /// `out_of_order`, but only when the variable is actually set.
    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("SCHEMACHANGE_OUT_OF_ORDER") {
            if let Some(parsed) = parse_bool_env(&raw) {
                self.out_of_order = Some(parsed);
            }
        }
    }

    /// A CLI `--out-of-order` flag takes precedence over both the config
    /// file and the environment variable.
    pub fn with_out_of_order_flag(mut self, flag: bool) -> Self {
        if flag {
            self.out_of_order = Some(true);
        }
        self
    }

    pub fn effective_out_of_order(&self) -> bool {
        self.out_of_order.unwrap_or(false)
    }

    /// Compiled case-insensitive: version numbers are matched regardless of case.
    pub fn version_number_regex(&self) -> Result<Option<Regex>, InfrastructureError> {
        match &self.version_number_validation_regex {
            None => Ok(None),
            Some(pattern) => {
                let compiled = Regex::new(&format!("(?i){pattern}")).map_err(|e| {
                    InfrastructureError::Config(format!(
                        "invalid version_number_validation_regex '{pattern}': {e}"
                    ))
                })?;
                Ok(Some(compiled))
            }
        }
    }
}

fn parse_bool_env(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let yaml = "root_folder: ./migrations\n";
        let config = DeployConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.root_folder, PathBuf::from("./migrations"));
        assert!(config.create_change_history_table);
        assert_eq!(config.out_of_order, None);
        assert!(!config.effective_out_of_order());
    }

    // `apply_env_overrides` itself just feeds `std::env::var` through
    // `parse_bool_env`, so the three-state logic (present-true,
    // present-false, absent) is exercised directly here instead of via
    // `std::env::set_var`/`remove_var`, which are `unsafe fn` under this
    // edition and would race with every other test reading process env.
    #[test]
    fn parse_bool_env_recognises_true_and_false_spellings() {
        assert_eq!(parse_bool_env("true"), Some(true));
        assert_eq!(parse_bool_env("1"), Some(true));
        assert_eq!(parse_bool_env("yes"), Some(true));
        assert_eq!(parse_bool_env("ON"), Some(true));
        assert_eq!(parse_bool_env("false"), Some(false));
        assert_eq!(parse_bool_env("0"), Some(false));
        assert_eq!(parse_bool_env("no"), Some(false));
        assert_eq!(parse_bool_env("OFF"), Some(false));
    }

    #[test]
    fn parse_bool_env_rejects_unrecognised_values() {
        assert_eq!(parse_bool_env("maybe"), None);
        assert_eq!(parse_bool_env(""), None);
    }

    #[test]
    fn cli_flag_overrides_config_and_env() {
        let yaml = "root_folder: ./migrations\nout_of_order: false\n";
        let config = DeployConfig::from_yaml_str(yaml).unwrap().with_out_of_order_flag(true);
        assert_eq!(config.out_of_order, Some(true));
    }

    #[test]
    fn version_regex_is_case_insensitive() {
        let yaml = "root_folder: .\nversion_number_validation_regex: '^[0-9.]+$'\n";
        let config = DeployConfig::from_yaml_str(yaml).unwrap();
        let re = config.version_number_regex().unwrap().unwrap();
        assert!(re.is_match("1.2.3"));
    }

    #[test]
    fn missing_file_fails_with_config_not_found() {
        let err = DeployConfig::from_yaml_file(Path::new("/no/such/schemachange-config.yml"))
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::ConfigNotFound(_)));
    }
}
