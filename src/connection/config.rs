use crate::core::{DbError, Result};
use crate::gtt::GttConfig;
use crate::storage::catalog::PUBLIC_SCHEMA;

/// Session configuration
///
/// Built in the usual builder style:
///
/// ```ignore
/// let config = SessionConfig::new("alice")
///     .search_path(&["app", "public"])
///     .global_temp(GttConfig::new().schema("gtt"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Role the session runs as
    pub user: String,

    /// Initial search_path
    pub search_path: Vec<String>,

    /// Global temporary table settings, `None` leaves the subsystem out of the session
    pub global_temp: Option<GttConfig>,
}

impl SessionConfig {
    /// Create a new session configuration
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            search_path: vec![PUBLIC_SCHEMA.to_string()],
            global_temp: Some(GttConfig::default()),
        }
    }

    /// Set the initial search_path
    pub fn search_path(mut self, schemas: &[&str]) -> Self {
        self.search_path = schemas.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the global temporary table configuration
    pub fn global_temp(mut self, config: GttConfig) -> Self {
        self.global_temp = Some(config);
        self
    }

    /// Open the session without global temporary tables
    pub fn without_global_temp(mut self) -> Self {
        self.global_temp = None;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(DbError::Configuration("user name cannot be empty".into()));
        }
        if let Some(config) = &self.global_temp {
            config.validate()?;
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(crate::executor::context::BOOTSTRAP_SUPERUSER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.user, "admin");
        assert_eq!(config.search_path, vec!["public"]);
        assert_eq!(config.global_temp, Some(GttConfig::default()));
    }

    #[test]
    fn test_builder_pattern() {
        let config = SessionConfig::new("alice")
            .search_path(&["app", "public"])
            .global_temp(GttConfig::new().schema("templates").enabled(false));

        assert_eq!(config.search_path, vec!["app", "public"]);
        let gtt = config.global_temp.as_ref().unwrap();
        assert_eq!(gtt.schema, "templates");
        assert!(!gtt.enabled);

        assert!(config.without_global_temp().global_temp.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(SessionConfig::new("alice").validate().is_ok());
        assert!(SessionConfig::new(" ").validate().is_err());
        assert!(
            SessionConfig::new("alice")
                .global_temp(GttConfig::new().schema(""))
                .validate()
                .is_err()
        );
    }
}
