//! PostgreSQL target store operations.

mod pool;
mod registry;
pub mod value;

pub use pool::PgTarget;
pub use registry::TargetRegistry;
pub use value::{qualify_table, quote_ident, quote_literal, SqlValue};

use crate::error::Result;
use crate::transform::SequenceDeclaration;
use crate::typemap::{to_postgres, ColumnType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A column of a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl TargetColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Operations the direct exporter needs from a live target store.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Create a schema if it doesn't exist.
    async fn create_schema(&self, schema: &str) -> Result<()>;

    /// Create a table if it doesn't exist.
    async fn ensure_table(&self, schema: &str, table: &str, columns: &[TargetColumn]) -> Result<()>;

    /// Insert one batch of rows. Returns rows written.
    async fn insert_batch(
        &self,
        schema: &str,
        table: &str,
        columns: &[TargetColumn],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64>;

    /// Create a sequence and position it so its next value is `start`.
    async fn apply_sequence(&self, schema: &str, sequence: &SequenceDeclaration) -> Result<()>;

    /// Close all connections.
    async fn close(&self);
}

/// `CREATE TABLE IF NOT EXISTS` for the given columns.
pub fn create_table_ddl(schema: &str, table: &str, columns: &[TargetColumn]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("    {} {}", quote_ident(&c.name), to_postgres(c.column_type)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        qualify_table(schema, table),
        cols.join(",\n")
    )
}

/// Statements that create a sequence whose next value is `start`.
pub fn sequence_ddl(schema: &str, sequence: &SequenceDeclaration) -> Vec<String> {
    let name = qualify_table(schema, &sequence.name);
    vec![
        format!(
            "CREATE SEQUENCE IF NOT EXISTS {} START WITH {}",
            name, sequence.start
        ),
        format!(
            "SELECT setval({}, {}, false)",
            quote_literal(&name),
            sequence.start
        ),
    ]
}

/// Build a parameterized multi-row INSERT.
///
/// Every parameter is sent as text and cast server-side to the column type,
/// so one statement shape serves every row regardless of NULLs.
pub fn build_insert_sql(
    schema: &str,
    table: &str,
    columns: &[TargetColumn],
    rows: &[Vec<SqlValue>],
) -> (String, Vec<Option<String>>) {
    let col_list: String = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params = Vec::with_capacity(rows.len() * columns.len());
    let mut idx = 1;

    for row in rows {
        let row_placeholders: Vec<String> = columns
            .iter()
            .map(|col| {
                let p = match col.column_type {
                    ColumnType::Text => format!("${}::text", idx),
                    other => format!("${}::text::{}", idx, to_postgres(other)),
                };
                idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));

        for i in 0..columns.len() {
            params.push(row.get(i).and_then(SqlValue::to_param));
        }
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualify_table(schema, table),
        col_list,
        placeholders.join(", ")
    );

    (sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<TargetColumn> {
        vec![
            TargetColumn::new("customer_name", ColumnType::Text),
            TargetColumn::new("quantity", ColumnType::Integer),
        ]
    }

    #[test]
    fn test_create_table_ddl() {
        let ddl = create_table_ddl("public", "customers", &columns());
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"customers\""));
        assert!(ddl.contains("\"customer_name\" text"));
        assert!(ddl.contains("\"quantity\" bigint"));
    }

    #[test]
    fn test_sequence_ddl() {
        let stmts = sequence_ddl(
            "public",
            &SequenceDeclaration {
                name: "work_order_seq".to_string(),
                source_table: "tblWorkOrderCounter".to_string(),
                start: 1043,
            },
        );
        assert_eq!(
            stmts[0],
            "CREATE SEQUENCE IF NOT EXISTS \"public\".\"work_order_seq\" START WITH 1043"
        );
        assert!(stmts[1].contains("setval('\"public\".\"work_order_seq\"', 1043, false)"));
    }

    #[test]
    fn test_build_insert_sql() {
        let rows = vec![
            vec![SqlValue::Text("Acme".into()), SqlValue::I64(4)],
            vec![SqlValue::Text("Baker".into()), SqlValue::Null],
        ];
        let (sql, params) = build_insert_sql("public", "orders", &columns(), &rows);
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"orders\" (\"customer_name\", \"quantity\") VALUES \
             ($1::text, $2::text::bigint), ($3::text, $4::text::bigint)"
        );
        assert_eq!(
            params,
            vec![
                Some("Acme".to_string()),
                Some("4".to_string()),
                Some("Baker".to_string()),
                None
            ]
        );
    }
}
