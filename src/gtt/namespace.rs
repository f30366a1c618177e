use tracing::debug;

use super::host::HostEngine;
use crate::core::Result;

/// Appends `schema` to the session's search path unless it is already there.
///
/// Unqualified template names then always reach the placeholder, whatever
/// the caller did to the path. Returns whether the path changed.
pub fn ensure_schema_visible(host: &mut dyn HostEngine, schema: &str) -> Result<bool> {
    let mut path = host.search_path();
    if !append_schema(&mut path, schema) {
        return Ok(false);
    }
    debug!(schema, ?path, "forcing managing schema into search_path");
    host.set_search_path(path)?;
    Ok(true)
}

/// Appends `schema` to a search path list when missing.
pub fn append_schema(path: &mut Vec<String>, schema: &str) -> bool {
    if path.iter().any(|entry| entry == schema) {
        return false;
    }
    path.push(schema.to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_schema_once() {
        let mut path = vec!["public".to_string()];
        assert!(append_schema(&mut path, "gtt"));
        assert!(!append_schema(&mut path, "gtt"));
        assert_eq!(path, vec!["public", "gtt"]);

        let mut empty = Vec::new();
        assert!(append_schema(&mut empty, "gtt"));
        assert_eq!(empty, vec!["gtt"]);
    }
}
