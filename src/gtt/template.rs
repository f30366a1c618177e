use crate::core::RelationId;
use crate::parser::ast::OnCommit;

/// Durable definition of a global temporary table, one registry row.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// The empty relation standing in for the template in the managing schema.
    pub placeholder_id: RelationId,
    pub owning_schema: String,
    pub name: String,
    /// Rows of a materialization survive commit (`ON COMMIT PRESERVE ROWS`).
    pub preserve_on_commit: bool,
    /// Column list of the table form, or `AS <query>` for the query form.
    pub definition_text: String,
}

impl Template {
    pub fn on_commit(&self) -> OnCommit {
        if self.preserve_on_commit {
            OnCommit::PreserveRows
        } else {
            OnCommit::DeleteRows
        }
    }

    /// Query body of a `CREATE ... AS` template.
    pub fn query(&self) -> Option<&str> {
        let text = self.definition_text.trim_start();
        let head = text.get(..3)?;
        if head.eq_ignore_ascii_case("AS ") || head.eq_ignore_ascii_case("AS(") {
            Some(text[2..].trim())
        } else {
            None
        }
    }
}

/// A template as seen by one session: its definition plus this session's materialization.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBinding {
    pub template: Template,
    pub materialized_id: Option<RelationId>,
}

impl SessionBinding {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            materialized_id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized_id.is_some()
    }

    pub fn reset(&mut self) {
        self.materialized_id = None;
    }

    /// Whether `id` denotes this template, either its placeholder or its materialization.
    pub fn denotes(&self, id: RelationId) -> bool {
        self.template.placeholder_id == id || self.materialized_id == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(definition: &str) -> Template {
        Template {
            placeholder_id: RelationId(16400),
            owning_schema: "gtt".into(),
            name: "t".into(),
            preserve_on_commit: false,
            definition_text: definition.into(),
        }
    }

    #[test]
    fn test_query_form_detection() {
        assert_eq!(template("AS SELECT 1").query(), Some("SELECT 1"));
        assert_eq!(template("as (SELECT id FROM src)").query(), Some("(SELECT id FROM src)"));
        assert_eq!(template("id INTEGER, aspect TEXT").query(), None);
        assert_eq!(template("").query(), None);
    }

    #[test]
    fn test_binding_lifecycle() {
        let mut binding = SessionBinding::new(template("id INTEGER"));
        assert!(!binding.is_materialized());
        assert_eq!(binding.template.on_commit(), OnCommit::DeleteRows);

        binding.materialized_id = Some(RelationId(16500));
        assert!(binding.denotes(RelationId(16500)));
        assert!(binding.denotes(RelationId(16400)));
        binding.reset();
        assert!(!binding.denotes(RelationId(16500)));
    }
}
