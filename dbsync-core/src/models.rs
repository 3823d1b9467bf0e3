//! Core data models for the sync protocol.
//!
//! These types travel between the remote Inspector, the transfer client and
//! the orchestrator. They carry schema object names, recreate statements and
//! row pages, never credentials.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of table data: column name to cell value.
pub type Row = Map<String, Value>;

/// The five kinds of schema object a sync clones, in deployment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaObjectKind {
    Table,
    View,
    Procedure,
    Function,
    Trigger,
}

impl SchemaObjectKind {
    /// All kinds in the order the orchestrator deploys them.
    pub const DEPLOY_ORDER: [SchemaObjectKind; 5] = [
        SchemaObjectKind::Table,
        SchemaObjectKind::View,
        SchemaObjectKind::Procedure,
        SchemaObjectKind::Function,
        SchemaObjectKind::Trigger,
    ];

    /// SQL keyword used in `CREATE`/`DROP` statements.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::Procedure => "PROCEDURE",
            Self::Function => "FUNCTION",
            Self::Trigger => "TRIGGER",
        }
    }

    /// Plural label used in logs and stats.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Table => "tables",
            Self::View => "views",
            Self::Procedure => "procedures",
            Self::Function => "functions",
            Self::Trigger => "triggers",
        }
    }
}

impl std::fmt::Display for SchemaObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Procedure => "procedure",
            Self::Function => "function",
            Self::Trigger => "trigger",
        };
        f.write_str(label)
    }
}

/// A remote schema object together with the statement that recreates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaObject {
    pub kind: SchemaObjectKind,
    pub name: String,
    pub create_statement: String,
}

impl SchemaObject {
    /// Creates a schema object value.
    pub fn new(
        kind: SchemaObjectKind,
        name: impl Into<String>,
        create_statement: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            create_statement: create_statement.into(),
        }
    }

    /// True when the remote side returned no usable DDL.
    pub fn is_missing_definition(&self) -> bool {
        self.create_statement.trim().is_empty()
    }

    /// `DROP ... IF EXISTS` statement for this object.
    pub fn drop_statement(&self) -> String {
        crate::sql::drop_if_exists(self.kind, &self.name)
    }
}

/// Offset-based cursor over a table's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCursor {
    pub offset: u64,
    pub page_size: u64,
    pub total_rows: Option<u64>,
    pub has_more: bool,
}

impl RowCursor {
    /// Cursor positioned before the first page.
    pub fn start(page_size: u64) -> Self {
        Self {
            offset: 0,
            page_size,
            total_rows: None,
            has_more: true,
        }
    }

    /// Moves past a received page.
    pub fn advance(&mut self, page: &TablePage) {
        self.offset = self.offset.saturating_add(page.rows.len() as u64);
        self.total_rows = Some(page.total_rows);
        self.has_more = page.has_more;
    }
}

/// One page of table data as returned by `get_table_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePage {
    pub rows: Vec<Row>,
    pub total_rows: u64,
    pub offset: u64,
    pub limit: u64,
    pub has_more: bool,
}

impl TablePage {
    /// Builds a page, deriving `has_more` from the offset arithmetic.
    pub fn new(rows: Vec<Row>, total_rows: u64, offset: u64, limit: u64) -> Self {
        Self {
            rows,
            total_rows,
            offset,
            limit,
            has_more: offset.saturating_add(limit) < total_rows,
        }
    }
}

/// Trigger metadata as returned by `get_triggers`.
///
/// The Inspector does not return trigger DDL; the orchestrator assembles it
/// from these fields with [`TriggerDefinition::create_statement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub trigger: String,
    /// `BEFORE` or `AFTER`
    pub timing: String,
    /// `INSERT`, `UPDATE` or `DELETE`
    pub event: String,
    pub table: String,
    pub statement: String,
}

impl TriggerDefinition {
    /// Synthesizes the `CREATE TRIGGER` statement.
    pub fn create_statement(&self) -> String {
        format!(
            "CREATE TRIGGER {} {} {} ON {} FOR EACH ROW {}",
            crate::sql::quote_identifier(&self.trigger),
            self.timing.trim().to_uppercase(),
            self.event.trim().to_uppercase(),
            crate::sql::quote_identifier(&self.table),
            self.statement.trim()
        )
    }

    /// Converts into the generic schema object form.
    pub fn to_schema_object(&self) -> SchemaObject {
        SchemaObject::new(
            SchemaObjectKind::Trigger,
            self.trigger.clone(),
            self.create_statement(),
        )
    }
}

/// Payload of the `get_*s` listing actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameList {
    pub names: Vec<String>,
}

/// Payload of the `get_*_structure` actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub name: String,
    pub create_statement: String,
}

/// Payload of the `get_triggers` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerList {
    pub triggers: Vec<TriggerDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row
    }

    #[test]
    fn test_table_page_has_more() {
        let page = TablePage::new(vec![row(1), row(2)], 3, 0, 2);
        assert!(page.has_more);

        let page = TablePage::new(vec![row(3)], 3, 2, 2);
        assert!(!page.has_more);

        let page = TablePage::new(vec![row(1), row(2)], 4, 2, 2);
        assert!(!page.has_more);
    }

    #[test]
    fn test_row_cursor_advance() {
        let mut cursor = RowCursor::start(2);
        assert!(cursor.has_more);

        cursor.advance(&TablePage::new(vec![row(1), row(2)], 3, 0, 2));
        assert_eq!(cursor.offset, 2);
        assert_eq!(cursor.total_rows, Some(3));
        assert!(cursor.has_more);

        cursor.advance(&TablePage::new(vec![row(3)], 3, 2, 2));
        assert_eq!(cursor.offset, 3);
        assert!(!cursor.has_more);
    }

    #[test]
    fn test_trigger_create_statement() {
        let trigger = TriggerDefinition {
            trigger: "users_bi".to_string(),
            timing: "before".to_string(),
            event: "INSERT".to_string(),
            table: "users".to_string(),
            statement: "SET NEW.created_at = NOW()".to_string(),
        };

        assert_eq!(
            trigger.create_statement(),
            "CREATE TRIGGER `users_bi` BEFORE INSERT ON `users` FOR EACH ROW SET NEW.created_at = NOW()"
        );
        let object = trigger.to_schema_object();
        assert_eq!(object.kind, SchemaObjectKind::Trigger);
        assert_eq!(object.drop_statement(), "DROP TRIGGER IF EXISTS `users_bi`");
    }

    #[test]
    fn test_missing_definition() {
        assert!(SchemaObject::new(SchemaObjectKind::Table, "orders", "  ").is_missing_definition());
        assert!(
            !SchemaObject::new(SchemaObjectKind::View, "v", "CREATE VIEW v AS SELECT 1")
                .is_missing_definition()
        );
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&SchemaObjectKind::Procedure).unwrap(),
            "\"procedure\""
        );
        assert_eq!(SchemaObjectKind::Function.sql_keyword(), "FUNCTION");
        assert_eq!(SchemaObjectKind::DEPLOY_ORDER[0], SchemaObjectKind::Table);
    }
}
