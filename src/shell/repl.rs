//! Interactive REPL (Read-Eval-Print Loop) over a nested-transaction handle.

use std::fmt;
use std::io::{self, Write};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};

use super::command::{classify, Input};
use super::error::{ShellError, ShellResult};
use crate::connection::{Connection, QueryResult, SqlValue};
use crate::transaction::Handle;

/// Shell configuration.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Prompt string.
    pub prompt: String,
    /// Show timing information.
    pub timing: bool,
    /// Max rows to display.
    pub max_rows: usize,
    /// How query rows are printed.
    pub mode: OutputMode,
}

/// Row output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Aligned text table.
    #[default]
    Table,
    /// One JSON object per row.
    Json,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Table => write!(f, "table"),
            OutputMode::Json => write!(f, "json"),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "nestedtx> ".into(),
            timing: false,
            max_rows: 100,
            mode: OutputMode::Table,
        }
    }
}

/// Result of evaluating one piece of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Rows returned by a query.
    Rows(QueryResult),
    /// Rows changed by a statement.
    Affected(u64),
    /// Informational text.
    Message(String),
    /// The user asked to leave.
    Quit,
}

/// The interactive shell.
///
/// Keeps one handle per open level; the last one receives all statements.
pub struct Repl<C: Connection + ?Sized> {
    root: Handle<C>,
    levels: Vec<Handle<C>>,
    config: ShellConfig,
    history: Vec<String>,
}

impl<C: Connection + ?Sized> Repl<C> {
    /// Create a new shell over a root handle.
    pub fn new(root: Handle<C>) -> Self {
        Self::with_config(root, ShellConfig::default())
    }

    /// Create a shell with custom configuration.
    pub fn with_config(root: Handle<C>, config: ShellConfig) -> Self {
        Self {
            root,
            levels: Vec::new(),
            config,
            history: Vec::new(),
        }
    }

    /// The handle statements currently go through.
    pub fn current(&self) -> &Handle<C> {
        self.levels.last().unwrap_or(&self.root)
    }

    /// Number of open levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Evaluate one complete input and return what it produced.
    ///
    /// Statements before a failing one keep their effect.
    pub async fn execute(&mut self, input: &str) -> ShellResult<Vec<Output>> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Vec::new());
        }
        self.history.push(input.to_string());

        let mut outputs = Vec::new();
        for item in classify(input) {
            let output = self.eval(item).await?;
            let quit = output == Output::Quit;
            outputs.push(output);
            if quit {
                break;
            }
        }
        Ok(outputs)
    }

    async fn eval(&mut self, input: Input) -> ShellResult<Output> {
        match input {
            Input::Begin => self.begin().await,
            Input::Commit => self.commit().await,
            Input::Rollback => self.rollback().await,
            Input::Command { name, args } => self.handle_command(&name, &args),
            Input::Sql { sql, returns_rows } => {
                let current = self.current();
                if returns_rows {
                    Ok(Output::Rows(current.query(&sql, &[]).await?))
                } else {
                    Ok(Output::Affected(current.execute(&sql, &[]).await?))
                }
            }
        }
    }

    async fn begin(&mut self) -> ShellResult<Output> {
        let next = self.current().transaction().await?;
        let message = match next.savepoint() {
            Some(name) => format!("SAVEPOINT {} (depth {})", name, next.depth()),
            None => format!("BEGIN (depth {})", next.depth()),
        };
        self.levels.push(next);
        Ok(Output::Message(message))
    }

    async fn commit(&mut self) -> ShellResult<Output> {
        let current = self.current().clone();
        current.commit().await?;
        self.levels.pop();
        Ok(Output::Message(format!("COMMIT (depth {})", current.depth())))
    }

    async fn rollback(&mut self) -> ShellResult<Output> {
        let current = self.current().clone();
        current.rollback().await?;
        self.levels.pop();
        Ok(Output::Message(format!("ROLLBACK (depth {})", current.depth())))
    }

    /// Roll back whatever is still open, outermost first.
    pub async fn close(&mut self) -> ShellResult<()> {
        if let Some(outermost) = self.levels.first().cloned() {
            tracing::warn!(depth = self.levels.len(), "rolling back open transaction on exit");
            self.levels.clear();
            outermost.rollback().await?;
        }
        Ok(())
    }

    fn handle_command(&mut self, name: &str, args: &[String]) -> ShellResult<Output> {
        match name {
            "help" | "h" | "?" => Ok(Output::Message(help_text())),
            "quit" | "exit" | "q" => Ok(Output::Quit),
            "status" => Ok(Output::Message(self.status_text())),
            "history" => {
                let lines: Vec<String> = self
                    .history
                    .iter()
                    .enumerate()
                    .map(|(i, cmd)| format!("  {}: {}", i + 1, cmd))
                    .collect();
                Ok(Output::Message(format!("Command History:\n{}", lines.join("\n"))))
            }
            "timing" => {
                self.config.timing = match args.first().map(String::as_str) {
                    Some("on") => true,
                    Some("off") => false,
                    _ => !self.config.timing,
                };
                Ok(Output::Message(format!(
                    "Timing: {}",
                    if self.config.timing { "on" } else { "off" }
                )))
            }
            "mode" => {
                match args.first().map(|a| a.to_lowercase()).as_deref() {
                    Some("table") => self.config.mode = OutputMode::Table,
                    Some("json") => self.config.mode = OutputMode::Json,
                    None => {}
                    Some(other) => {
                        return Ok(Output::Message(format!(
                            "Unknown mode '{}'; use .mode table or .mode json",
                            other
                        )))
                    }
                }
                Ok(Output::Message(format!("Mode: {}", self.config.mode)))
            }
            other => Err(ShellError::UnknownCommand(other.to_string())),
        }
    }

    fn status_text(&self) -> String {
        if self.levels.is_empty() {
            return format!("No open transaction ({} connection, autocommit)", self.root.backend());
        }
        let mut out = format!("Open levels ({} connection):", self.root.backend());
        for level in &self.levels {
            let kind = match level.savepoint() {
                Some(name) => format!("savepoint {}", name),
                None => "transaction".to_string(),
            };
            out.push_str(&format!(
                "\n  depth {}: {} [{}] opened {}",
                level.depth(),
                kind,
                level.status(),
                level.context().opened_at().format("%H:%M:%S%.3f")
            ));
        }
        out
    }

    /// Run the shell interactively on stdin until EOF or `.quit`.
    pub async fn run(&mut self) -> ShellResult<()> {
        self.print_banner();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = io::stdout();
        let mut input = String::new();
        let mut multiline = false;

        loop {
            let prompt = if multiline { "     -> " } else { &self.config.prompt };
            print!("{}", prompt);
            stdout.flush()?;

            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };
            let line = line.trim_end();

            if line.is_empty() && !multiline {
                continue;
            }

            if multiline {
                input.push(' ');
            }
            input.push_str(line);

            // SQL continues until a line ends with `;`.
            if !input.ends_with(';') && !is_command(&input) {
                multiline = true;
                continue;
            }
            multiline = false;

            let cmd = std::mem::take(&mut input);
            let start = Instant::now();
            match self.execute(&cmd).await {
                Ok(outputs) => {
                    let quit = outputs.contains(&Output::Quit);
                    self.print_outputs(&outputs);
                    if self.config.timing {
                        println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
                    }
                    if quit {
                        break;
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        self.close().await
    }

    /// Print outputs the way the interactive shell does.
    pub fn print_outputs(&self, outputs: &[Output]) {
        for output in outputs {
            match output {
                Output::Rows(result) => match self.config.mode {
                    OutputMode::Table => print!("{}", format_table(result, self.config.max_rows)),
                    OutputMode::Json => match format_json(result, self.config.max_rows) {
                        Ok(text) => print!("{}", text),
                        Err(e) => eprintln!("Error: {}", e),
                    },
                },
                Output::Affected(n) => println!("{} row(s) affected", n),
                Output::Message(message) => println!("{}", message),
                Output::Quit => {}
            }
        }
    }

    fn print_banner(&self) {
        println!("nestedtx v{}", env!("CARGO_PKG_VERSION"));
        println!("Nested transactions over one connection. BEGIN nests, COMMIT/ROLLBACK close the current level.");
        println!("Type .help for commands, or enter SQL statements terminated by ';'.");
        println!();
    }
}

fn is_command(input: &str) -> bool {
    input.starts_with('.') || input.starts_with('\\')
}

fn help_text() -> String {
    [
        "Commands:",
        "  .help, .h, .?           Show this help message",
        "  .quit, .exit, .q        Exit (open transactions are rolled back)",
        "  .status                 Show open transaction levels",
        "  .history                Show command history",
        "  .timing [on|off]        Toggle timing display",
        "  .mode [table|json]      Set how query rows are printed",
        "  .begin                  Open a nested level",
        "  .commit                 Commit the current level",
        "  .rollback               Roll back the current level",
        "",
        "Transaction SQL:",
        "  BEGIN / START TRANSACTION / SAVEPOINT x    open a nested level",
        "  COMMIT / RELEASE SAVEPOINT x               commit the current level",
        "  ROLLBACK / ROLLBACK TO SAVEPOINT x         roll back the current level",
        "Savepoint names are generated; names typed after SAVEPOINT are ignored.",
    ]
    .join("\n")
}

/// Render a query result as an aligned text table.
fn format_table(result: &QueryResult, max_rows: usize) -> String {
    if result.is_empty() {
        return "(0 rows)\n".to_string();
    }

    let columns = result.columns();
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in &result.rows {
        for (i, value) in row.values().iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(format_value(value).len());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    out.push_str(&header.join(" | "));
    out.push('\n');

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&sep.join("-+-"));
    out.push('\n');

    let limit = result.len().min(max_rows);
    for row in result.rows.iter().take(limit) {
        let values: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, width)| {
                let val = row.get_by_index(i).map(format_value).unwrap_or_default();
                format!("{:width$}", val, width = *width)
            })
            .collect();
        out.push_str(values.join(" | ").trim_end());
        out.push('\n');
    }

    if result.len() > limit {
        out.push_str(&format!("... ({} more rows)\n", result.len() - limit));
    }
    out.push_str(&format!("({} rows)\n", result.len()));
    out
}

/// Render query rows as one JSON object per line.
fn format_json(result: &QueryResult, max_rows: usize) -> serde_json::Result<String> {
    let mut out = String::new();
    for row in result.rows.iter().take(max_rows) {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}

fn format_value(value: &SqlValue) -> String {
    value.to_string()
}
