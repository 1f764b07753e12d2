//! Classification of shell input.
//!
//! Transaction-control SQL typed by the user is never sent to the
//! connection; it is turned into an operation on the current handle so the
//! nesting chain stays in step with the database.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use sqlparser::tokenizer::{Location, Token, Tokenizer};

/// What a line of input asks the shell to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Open a nested level.
    Begin,
    /// Commit the current level.
    Commit,
    /// Roll back the current level.
    Rollback,
    /// A dot-command such as `.status`.
    Command { name: String, args: Vec<String> },
    /// Any other SQL, forwarded to the connection.
    Sql { sql: String, returns_rows: bool },
}

/// Classify one complete input: a dot-command, or one or more SQL
/// statements separated by `;`. Each statement is classified on its own so
/// syntax sqlparser rejects in one of them doesn't affect the others.
pub fn classify(input: &str) -> Vec<Input> {
    let input = input.trim();

    if input.starts_with(['.', '\\']) {
        return vec![classify_command(input)];
    }

    split_statements(input).into_iter().map(classify_sql).collect()
}

fn classify_sql(sql: String) -> Input {
    match SqlParser::parse_sql(&GenericDialect {}, &sql) {
        Ok(statements) if statements.len() == 1 => classify_statement(&statements[0], sql),
        _ => classify_fallback(sql),
    }
}

/// Split SQL text on top-level `;`, leaving semicolons inside string
/// literals, quoted identifiers and comments alone.
fn split_statements(sql: &str) -> Vec<String> {
    let tokens = match Tokenizer::new(&GenericDialect {}, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(_) => return split_on_semicolons(sql),
    };

    let mut pieces = Vec::new();
    let mut start = 0;
    for token in tokens.iter().filter(|t| t.token == Token::SemiColon) {
        match byte_offset(sql, token.span.start) {
            Some(at) if at >= start => {
                pieces.push(&sql[start..at]);
                start = at + 1;
            }
            _ => return split_on_semicolons(sql),
        }
    }
    pieces.push(&sql[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

/// Byte offset of a tokenizer location (1-based line, 1-based char column).
fn byte_offset(sql: &str, location: Location) -> Option<usize> {
    let line = usize::try_from(location.line.checked_sub(1)?).ok()?;
    let column = usize::try_from(location.column.checked_sub(1)?).ok()?;
    let line_start: usize = sql.split_inclusive('\n').take(line).map(str::len).sum();
    sql[line_start..]
        .char_indices()
        .nth(column)
        .map(|(i, _)| line_start + i)
}

/// Plain split for text the tokenizer cannot read (e.g. an unterminated string).
fn split_on_semicolons(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

fn classify_command(input: &str) -> Input {
    let cmd = input.trim_start_matches(['.', '\\']);
    let mut parts = cmd.split_whitespace().map(str::to_string);
    let name = parts.next().unwrap_or_default().to_lowercase();
    match name.as_str() {
        "begin" => Input::Begin,
        "commit" => Input::Commit,
        "rollback" => Input::Rollback,
        _ => Input::Command {
            name,
            args: parts.collect(),
        },
    }
}

fn classify_statement(stmt: &sp::Statement, sql: String) -> Input {
    match stmt {
        sp::Statement::StartTransaction { .. } | sp::Statement::Savepoint { .. } => Input::Begin,
        sp::Statement::Commit { .. } | sp::Statement::ReleaseSavepoint { .. } => Input::Commit,
        sp::Statement::Rollback { .. } => Input::Rollback,
        sp::Statement::Query(_) | sp::Statement::Explain { .. } | sp::Statement::Pragma { .. } => {
            Input::Sql {
                sql,
                returns_rows: true,
            }
        }
        _ => Input::Sql {
            sql,
            returns_rows: false,
        },
    }
}

/// Keyword-based classification for statements sqlparser rejects
/// (dialect-specific syntax).
fn classify_fallback(sql: String) -> Input {
    let upper = sql.to_uppercase();
    let first = upper
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches(';');
    match first {
        "BEGIN" | "SAVEPOINT" => Input::Begin,
        "COMMIT" | "END" | "RELEASE" => Input::Commit,
        "ROLLBACK" => Input::Rollback,
        _ => Input::Sql {
            returns_rows: matches!(first, "SELECT" | "WITH" | "VALUES" | "PRAGMA" | "EXPLAIN"),
            sql,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(input: &str) -> Input {
        let mut inputs = classify(input);
        assert_eq!(inputs.len(), 1, "expected one input for {:?}", input);
        inputs.remove(0)
    }

    #[test]
    fn test_transaction_control_sql() {
        assert_eq!(one("BEGIN;"), Input::Begin);
        assert_eq!(one("start transaction"), Input::Begin);
        assert_eq!(one("SAVEPOINT a"), Input::Begin);
        assert_eq!(one("COMMIT"), Input::Commit);
        assert_eq!(one("RELEASE SAVEPOINT a;"), Input::Commit);
        assert_eq!(one("ROLLBACK"), Input::Rollback);
        assert_eq!(one("ROLLBACK TO SAVEPOINT a"), Input::Rollback);
    }

    #[test]
    fn test_dot_commands() {
        assert_eq!(one(".begin"), Input::Begin);
        assert_eq!(one("\\commit"), Input::Commit);
        assert_eq!(one(".ROLLBACK"), Input::Rollback);
        assert_eq!(
            one(".status now"),
            Input::Command {
                name: "status".into(),
                args: vec!["now".into()],
            }
        );
    }

    #[test]
    fn test_data_sql() {
        assert_eq!(
            one("SELECT * FROM t;"),
            Input::Sql {
                sql: "SELECT * FROM t".into(),
                returns_rows: true,
            }
        );
        assert_eq!(
            one("INSERT INTO t (x) VALUES (1)"),
            Input::Sql {
                sql: "INSERT INTO t (x) VALUES (1)".into(),
                returns_rows: false,
            }
        );
    }

    #[test]
    fn test_multiple_statements() {
        let inputs = classify("BEGIN; INSERT INTO t (x) VALUES (1); COMMIT;");
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0], Input::Begin);
        assert!(matches!(&inputs[1], Input::Sql { sql, returns_rows: false } if sql.starts_with("INSERT")));
        assert_eq!(inputs[2], Input::Commit);
    }

    #[test]
    fn test_batch_with_dialect_specific_statement() {
        let inputs = classify("BEGIN; CREATE TABLE t (x) STRICT; COMMIT;");
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0], Input::Begin);
        assert_eq!(
            inputs[1],
            Input::Sql {
                sql: "CREATE TABLE t (x) STRICT".into(),
                returns_rows: false,
            }
        );
        assert_eq!(inputs[2], Input::Commit);

        let inputs = classify("SAVEPOINT a; CREATE TABLE u (y) STRICT; SELECT 'a;b' FROM u");
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0], Input::Begin);
        assert!(matches!(&inputs[1], Input::Sql { sql, returns_rows: false } if sql.starts_with("CREATE TABLE u")));
        assert!(matches!(&inputs[2], Input::Sql { sql, returns_rows: true } if sql.contains("'a;b'")));
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(split_statements("a; b ;; c"), ["a", "b", "c"]);
        assert_eq!(split_statements("SELECT ';' AS s; x"), ["SELECT ';' AS s", "x"]);
        assert_eq!(
            split_statements("INSERT INTO t VALUES ('it''s; é');\nSELECT 1 -- done; really\n;"),
            ["INSERT INTO t VALUES ('it''s; é')", "SELECT 1 -- done; really"]
        );
        assert_eq!(split_on_semicolons("BEGIN; 'oops"), ["BEGIN", "'oops"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(classify("  ;  ").is_empty());
    }

    #[test]
    fn test_unparseable_sql_falls_back_to_keywords() {
        assert!(matches!(one("SELEKT nonsense FROM"), Input::Sql { returns_rows: false, .. }));
        assert!(matches!(one("select ((("), Input::Sql { returns_rows: true, .. }));
        assert_eq!(one("rollback to nowhere at all"), Input::Rollback);
    }
}
