//! Ordered statement batches for all-or-nothing execution.

use crate::error::{DbError, DbResult};
use crate::models::query::{QueryParam, Statement};

/// An ordered list of statements run inside one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    statements: Vec<Statement>,
}

impl Batch {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// Split a script on `;` terminators into parameterless statements.
    ///
    /// Terminators inside single-quoted strings, double-quoted identifiers and
    /// backtick identifiers are part of the statement. Whitespace-only
    /// fragments are discarded.
    pub fn parse(script: &str) -> Self {
        let mut statements = Vec::new();
        let mut quote: Option<char> = None;
        let mut start = 0;

        for (i, c) in script.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"' | '`') => quote = Some(c),
                (None, ';') => {
                    push_fragment(&mut statements, &script[start..i]);
                    start = i + 1;
                }
                (None, _) => {}
            }
        }
        push_fragment(&mut statements, &script[start..]);

        Self { statements }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// A batch must hold at least one statement, and every statement must be valid.
    pub fn validate(&self) -> DbResult<()> {
        if self.statements.is_empty() {
            return Err(DbError::invalid_input(
                "Batch must contain at least one statement",
            ));
        }
        for (index, statement) in self.statements.iter().enumerate() {
            statement
                .validate()
                .map_err(|_| DbError::invalid_input(format!("Statement {index} is empty")))?;
        }
        Ok(())
    }
}

fn push_fragment(statements: &mut Vec<Statement>, fragment: &str) {
    let sql = fragment.trim();
    if !sql.is_empty() {
        statements.push(Statement::raw(sql));
    }
}

impl From<Vec<Statement>> for Batch {
    fn from(statements: Vec<Statement>) -> Self {
        Self::new(statements)
    }
}

impl<S: Into<String>> From<Vec<(S, Vec<QueryParam>)>> for Batch {
    fn from(pairs: Vec<(S, Vec<QueryParam>)>) -> Self {
        Self::new(pairs.into_iter().map(Statement::from).collect())
    }
}

impl From<&str> for Batch {
    fn from(script: &str) -> Self {
        Self::parse(script)
    }
}

impl From<String> for Batch {
    fn from(script: String) -> Self {
        Self::parse(&script)
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Statement;
    type IntoIter = std::slice::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}
