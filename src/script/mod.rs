//! Migration scripts and the statement executor contract.
//!
//! Each migration file yields two ordered statement lists, `up` and `down`.
//! Statements are executed through an [`Executor`] or rendered for a dry run
//! through `Display`.

pub mod parser;

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, ExecutionError, Result};

/// Which half of a migration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A single executable statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// Statement text without the terminating `;`.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};", self.sql)
    }
}

/// Parsed migration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub up: Vec<Statement>,
    pub down: Vec<Statement>,
}

impl Script {
    /// Parse script text. Lines before the first marker belong to `up`; a
    /// script without markers is entirely `up`.
    ///
    /// Markers are matched per line before quotes are tokenized, so a line
    /// reading `-- down` inside a dollar-quoted body still switches sections.
    /// The body is then left unterminated and parsing fails.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut up = String::new();
        let mut down = String::new();
        let mut current = Direction::Up;

        for line in content.split_inclusive('\n') {
            let bare = line.trim_end_matches(['\n', '\r']);
            if let Ok((_, direction)) = parser::section_marker(bare) {
                current = direction;
                // Keep line numbers meaningful in error messages.
                up.push('\n');
                down.push('\n');
                continue;
            }
            match current {
                Direction::Up => up.push_str(line),
                Direction::Down => down.push_str(line),
            }
        }

        let to_statements = |body: &str| -> std::result::Result<Vec<Statement>, String> {
            Ok(parser::split_statements(body)?
                .into_iter()
                .map(Statement::new)
                .collect())
        };

        Ok(Self {
            up: to_statements(&up).map_err(|e| format!("up section: {}", e))?,
            down: to_statements(&down).map_err(|e| format!("down section: {}", e))?,
        })
    }

    /// Read and parse a migration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|message| Error::Script {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn statements(&self, direction: Direction) -> &[Statement] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

/// Runs statements against the target database.
#[allow(async_fn_in_trait)]
pub trait Executor {
    async fn execute(&mut self, statement: &Statement) -> std::result::Result<(), ExecutionError>;
}
