//! DDL parsing on top of `sqlparser`.
//!
//! Only `CREATE TABLE` statements are turned into [`CreateTableStatement`];
//! every other statement that parses is reported as `None` so callers can skip
//! index and constraint DDL.

use sqlparser::ast::{ColumnDef, ColumnOption, DataType, Statement, TableConstraint};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::core::schema::{ColumnDefinition, ColumnType, CreateTableStatement, TypeTag};
use crate::error::{DumpError, Result};

/// Split DDL text into individual statements on top-level `;`.
///
/// Semicolons inside quoted strings and identifiers are not separators. Each
/// returned statement is trimmed and terminated with `;`. Empty fragments are
/// dropped.
pub fn split_statements(ddl: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in ddl.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' || ch == '`' => quote = Some(ch),
            None if ch == ';' => {
                push_statement(&mut statements, &current);
                current.clear();
                continue;
            }
            None => {}
        }
        current.push(ch);
    }
    push_statement(&mut statements, &current);

    statements
}

fn push_statement(statements: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        statements.push(format!("{};", trimmed));
    }
}

/// Parse one statement.
///
/// Returns `Ok(None)` for statements that parse but do not create a table.
pub fn parse_statement(text: &str) -> Result<Option<CreateTableStatement>> {
    let dialect = GenericDialect {};
    let ast = Parser::parse_sql(&dialect, text).map_err(|e| DumpError::SchemaParse {
        statement: text.trim().to_string(),
        message: e.to_string(),
    })?;

    for statement in ast {
        if let Statement::CreateTable {
            name,
            columns,
            constraints,
            ..
        } = statement
        {
            let table_name = name
                .0
                .last()
                .map(|ident| ident.value.clone())
                .ok_or_else(|| DumpError::SchemaParse {
                    statement: text.trim().to_string(),
                    message: "table name is empty".to_string(),
                })?;
            return Ok(Some(build_create_table(table_name, columns, constraints)));
        }
    }

    Ok(None)
}

fn build_create_table(
    table_name: String,
    columns: Vec<ColumnDef>,
    constraints: Vec<TableConstraint>,
) -> CreateTableStatement {
    let mut primary_key = Vec::new();

    for constraint in &constraints {
        if let TableConstraint::Unique {
            columns,
            is_primary: true,
            ..
        } = constraint
        {
            primary_key.extend(columns.iter().map(|c| c.value.clone()));
        }
    }

    let mut definitions = Vec::with_capacity(columns.len());
    for column in columns {
        let mut not_null = false;
        for option in &column.options {
            match &option.option {
                ColumnOption::NotNull => not_null = true,
                ColumnOption::Null => not_null = false,
                ColumnOption::Unique {
                    is_primary: true, ..
                } => {
                    not_null = true;
                    if !primary_key.contains(&column.name.value) {
                        primary_key.push(column.name.value.clone());
                    }
                }
                _ => {}
            }
        }

        if primary_key.contains(&column.name.value) {
            not_null = true;
        }

        definitions.push(ColumnDefinition::new(
            column.name.value,
            column_type(&column.data_type),
            not_null,
        ));
    }

    CreateTableStatement {
        table_name,
        columns: definitions,
        primary_key,
    }
}

/// Resolve a parsed data type into a column type.
fn column_type(data_type: &DataType) -> ColumnType {
    if matches!(data_type, DataType::Array(_)) {
        let rendered = data_type.to_string();
        let element = rendered
            .trim_start_matches("ARRAY<")
            .trim_end_matches('>')
            .trim_end_matches("[]");
        return ColumnType::array(TypeTag::from_type_name(base_type_name(element)));
    }

    ColumnType::scalar(TypeTag::from_type_name(base_type_name(
        &data_type.to_string(),
    )))
}

/// Strip length, precision and other parenthesized arguments from a type name.
fn base_type_name(rendered: &str) -> &str {
    match rendered.find('(') {
        Some(pos) => rendered[..pos].trim(),
        None => rendered.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let ddl = "CREATE TABLE a (id BIGINT);\n\nCREATE INDEX a_idx ON a (id)\n;  ;";
        let statements = split_statements(ddl);
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE a (id BIGINT);".to_string(),
                "CREATE INDEX a_idx ON a (id);".to_string(),
            ]
        );
    }

    #[test]
    fn test_split_ignores_quoted_semicolons() {
        let ddl = "CREATE TABLE \"a;b\" (note TEXT DEFAULT 'x;y')";
        let statements = split_statements(ddl);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].ends_with(";"));
    }

    #[test]
    fn test_parse_create_table() {
        let stmt = parse_statement(
            "CREATE TABLE Users (id INT64 NOT NULL, name STRING, PRIMARY KEY (id));",
        )
        .unwrap()
        .unwrap();

        assert_eq!(stmt.table_name, "Users");
        assert_eq!(stmt.primary_key, vec!["id".to_string()]);
        assert_eq!(stmt.columns.len(), 2);
        assert_eq!(stmt.columns[0].name, "id");
        assert_eq!(stmt.columns[0].column_type, ColumnType::scalar(TypeTag::Int64));
        assert!(stmt.columns[0].not_null);
        assert_eq!(stmt.columns[1].column_type, ColumnType::scalar(TypeTag::String));
        assert!(!stmt.columns[1].not_null);
    }

    #[test]
    fn test_parse_postgres_types() {
        let stmt = parse_statement(
            "CREATE TABLE public.events (\
                id bigint PRIMARY KEY, \
                label character varying(64), \
                score double precision NOT NULL, \
                payload bytea, \
                happened_on date, \
                created_at timestamp with time zone, \
                active boolean\
            );",
        )
        .unwrap()
        .unwrap();

        assert_eq!(stmt.table_name, "events");
        assert_eq!(stmt.primary_key, vec!["id".to_string()]);
        let tags: Vec<TypeTag> = stmt
            .columns
            .iter()
            .map(|c| c.column_type.tag.clone())
            .collect();
        assert_eq!(
            tags,
            vec![
                TypeTag::Int64,
                TypeTag::String,
                TypeTag::Float64,
                TypeTag::Bytes,
                TypeTag::Date,
                TypeTag::Timestamp,
                TypeTag::Bool,
            ]
        );
        assert!(stmt.columns[0].not_null);
        assert!(stmt.columns[2].not_null);
    }

    #[test]
    fn test_parse_array_column() {
        let stmt = parse_statement("CREATE TABLE t (id BIGINT, tags TEXT[]);")
            .unwrap()
            .unwrap();
        assert!(stmt.columns[1].column_type.is_array);
        assert_eq!(stmt.columns[1].column_type.tag, TypeTag::String);
    }

    #[test]
    fn test_parse_unknown_type_is_kept() {
        let stmt = parse_statement("CREATE TABLE t (amount NUMERIC(10, 2))")
            .unwrap()
            .unwrap();
        assert_eq!(
            stmt.columns[0].column_type.tag,
            TypeTag::Other("NUMERIC".to_string())
        );
    }

    #[test]
    fn test_non_table_statement_is_skipped() {
        let parsed = parse_statement("CREATE INDEX users_name_idx ON Users (name);").unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_error() {
        let err = parse_statement("CREATE TABLE (;").unwrap_err();
        assert!(matches!(err, DumpError::SchemaParse { .. }));
    }
}
