use std::collections::BTreeMap;

use tracing::debug;

use super::template::{SessionBinding, Template};
use crate::core::RelationId;

/// Per-session map from template name to its binding.
///
/// Owned by exactly one session and never shared.
#[derive(Debug, Default)]
pub struct SessionCache {
    bindings: BTreeMap<String, SessionBinding>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&SessionBinding> {
        self.bindings.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut SessionBinding> {
        self.bindings.get_mut(name)
    }

    /// Binding whose placeholder or materialization is `id`.
    pub fn find_by_relation(&self, id: RelationId) -> Option<&SessionBinding> {
        self.bindings.values().find(|b| b.denotes(id))
    }

    pub fn insert_or_replace(&mut self, binding: SessionBinding) {
        debug!(template = binding.name(), materialized = ?binding.materialized_id, "cache insert");
        self.bindings.insert(binding.name().to_string(), binding);
    }

    pub fn delete(&mut self, name: &str) -> Option<SessionBinding> {
        let removed = self.bindings.remove(name);
        if removed.is_some() {
            debug!(template = name, "cache delete");
        }
        removed
    }

    /// Moves a binding to a new key and renames its template.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> bool {
        match self.bindings.remove(old_name) {
            Some(mut binding) => {
                binding.template.name = new_name.to_string();
                debug!(from = old_name, to = new_name, "cache rename");
                self.bindings.insert(new_name.to_string(), binding);
                true
            }
            None => false,
        }
    }

    /// Brings the binding of `template`'s placeholder in line with its registry row.
    ///
    /// A binding cached under an older name moves to the current name and keeps
    /// its materialization. A binding under the current name that belongs to
    /// another placeholder is replaced. Returns whether anything changed.
    pub fn refresh(&mut self, template: Template) -> bool {
        if self.lookup(&template.name).is_some_and(|b| b.template == template) {
            return false;
        }
        let previous = self
            .bindings
            .iter()
            .find(|(_, b)| b.template.placeholder_id == template.placeholder_id)
            .map(|(key, _)| key.clone());
        let materialized_id = previous
            .and_then(|key| self.delete(&key))
            .and_then(|b| b.materialized_id);
        self.insert_or_replace(SessionBinding {
            template,
            materialized_id,
        });
        true
    }

    pub fn for_each(&self, mut f: impl FnMut(&SessionBinding)) {
        for binding in self.bindings.values() {
            f(binding);
        }
    }

    /// Empties the cache one entry at a time, restarting from the front after each removal.
    pub fn delete_all(&mut self) -> usize {
        let mut removed = 0;
        while let Some(name) = self.bindings.keys().next().cloned() {
            self.delete(&name);
            removed += 1;
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &SessionBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtt::template::Template;

    fn binding(name: &str, placeholder: u32) -> SessionBinding {
        SessionBinding::new(Template {
            placeholder_id: RelationId(placeholder),
            owning_schema: "gtt".into(),
            name: name.into(),
            preserve_on_commit: true,
            definition_text: "id INTEGER".into(),
        })
    }

    #[test]
    fn test_insert_replace_and_lookup() {
        let mut cache = SessionCache::new();
        cache.insert_or_replace(binding("orders", 16400));
        assert_eq!(cache.len(), 1);

        let mut materialized = binding("orders", 16400);
        materialized.materialized_id = Some(RelationId(16410));
        cache.insert_or_replace(materialized);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("orders").unwrap().is_materialized());
        assert_eq!(cache.find_by_relation(RelationId(16410)).unwrap().name(), "orders");
        assert!(cache.find_by_relation(RelationId(1)).is_none());
    }

    #[test]
    fn test_rename_moves_key() {
        let mut cache = SessionCache::new();
        cache.insert_or_replace(binding("old", 16400));
        assert!(cache.rename("old", "new"));
        assert!(cache.lookup("old").is_none());
        assert_eq!(cache.lookup("new").unwrap().template.name, "new");
        assert!(!cache.rename("missing", "other"));
    }

    #[test]
    fn test_refresh_follows_registry_name() {
        let mut cache = SessionCache::new();
        let mut stale = binding("t", 16400);
        stale.materialized_id = Some(RelationId(16410));
        cache.insert_or_replace(stale);
        cache.insert_or_replace(binding("u", 16390));

        // renamed elsewhere: moves onto the current name, replacing the dropped "u"
        assert!(cache.refresh(binding("u", 16400).template));
        assert!(cache.lookup("t").is_none());
        let moved = cache.lookup("u").unwrap();
        assert_eq!(moved.template.placeholder_id, RelationId(16400));
        assert_eq!(moved.materialized_id, Some(RelationId(16410)));
        assert_eq!(cache.len(), 1);

        assert!(!cache.refresh(binding("u", 16400).template));
        assert!(cache.refresh(binding("v", 16500).template));
        assert_eq!(cache.names(), vec!["u", "v"]);
    }

    #[test]
    fn test_delete_all() {
        let mut cache = SessionCache::new();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            cache.insert_or_replace(binding(name, 16400 + i as u32));
        }
        let mut seen = Vec::new();
        cache.for_each(|b| seen.push(b.name().to_string()));
        assert_eq!(seen, vec!["a", "b", "c"]);

        assert_eq!(cache.delete_all(), 3);
        assert!(cache.is_empty());
        assert!(cache.delete("a").is_none());
    }
}
