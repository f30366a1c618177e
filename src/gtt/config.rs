use crate::core::{DbError, Result};

pub const DEFAULT_SCHEMA: &str = "gtt";
pub const DEFAULT_REGISTRY_TABLE: &str = "global_temp_tables";
/// Session switch, `SET globaltemp.enabled = off` turns every hook into a pass-through.
pub const ENABLED_SETTING: &str = "globaltemp.enabled";

/// Global temporary table configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GttConfig {
    /// Schema holding the registry table and every template placeholder
    pub schema: String,

    /// Name of the registry table inside `schema`
    pub registry_table: String,

    /// Initial value of the session switch
    pub enabled: bool,
}

impl GttConfig {
    pub fn new() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            registry_table: DEFAULT_REGISTRY_TABLE.to_string(),
            enabled: true,
        }
    }

    /// Set the managing schema
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    /// Set the registry table name
    pub fn registry_table(mut self, table: &str) -> Self {
        self.registry_table = table.to_string();
        self
    }

    /// Set whether sessions start with the subsystem switched on
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema.trim().is_empty() {
            return Err(DbError::Configuration("managing schema name is empty".into()));
        }
        if self.registry_table.trim().is_empty() {
            return Err(DbError::Configuration("registry table name is empty".into()));
        }
        Ok(())
    }
}

impl Default for GttConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a boolean setting value the way SET accepts them.
pub fn parse_switch(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "t" => Ok(true),
        "off" | "false" | "no" | "0" | "f" => Ok(false),
        other => Err(DbError::ExecutionError(format!(
            "parameter \"{}\" requires a Boolean value, got \"{}\"",
            ENABLED_SETTING, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = GttConfig::new().schema("templates").enabled(false);
        assert_eq!(config.schema, "templates");
        assert_eq!(config.registry_table, DEFAULT_REGISTRY_TABLE);
        assert!(!config.enabled);
        assert!(config.validate().is_ok());
        assert!(GttConfig::new().schema(" ").validate().is_err());
    }

    #[test]
    fn test_parse_switch() {
        assert!(parse_switch("on").unwrap());
        assert!(parse_switch("TRUE").unwrap());
        assert!(!parse_switch("0").unwrap());
        assert!(!parse_switch("off").unwrap());
        assert!(parse_switch("maybe").is_err());
    }
}
