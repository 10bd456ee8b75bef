use crate::db::error::{Error, Result};
use crate::db::Driver;
use std::time::Duration;

enum Fragment {
    Literal(String),
    Escaped(String),
}

/// Builds a [`Task`] out of literal and escape-needing fragments, the way the original
/// streams text into a task via a typed appender (spec.md §4.7).
pub struct TaskBuilder {
    fragments: Vec<Fragment>,
    timeout: Duration,
}

impl TaskBuilder {
    pub fn new(timeout: Duration) -> Self {
        TaskBuilder { fragments: Vec::new(), timeout }
    }

    /// Append `text` verbatim, no escaping.
    pub fn literal(mut self, text: impl Into<String>) -> Self {
        self.fragments.push(Fragment::Literal(text.into()));
        self
    }

    /// Append `text` after server-side escaping at render time. Fails immediately if
    /// `text` is empty.
    pub fn escaped(mut self, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::InvalidArg);
        }
        self.fragments.push(Fragment::Escaped(text));
        Ok(self)
    }

    pub fn build(self) -> Task {
        Task { fragments: self.fragments, timeout: self.timeout }
    }
}

/// A fully composed statement, rendered against a specific driver only at execution
/// time (escaping is driver-specific).
pub struct Task {
    fragments: Vec<Fragment>,
    pub timeout: Duration,
}

impl Task {
    pub fn render(&self, driver: &dyn Driver) -> Result<String> {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Literal(text) => out.push_str(text),
                Fragment::Escaped(text) => out.push_str(&driver.escape_string(text)?),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connector::tests::MockDriver;

    #[test]
    fn test_render_concatenates_literal_and_escaped() {
        let task = TaskBuilder::new(Duration::from_secs(1))
            .literal("SELECT * FROM users WHERE name = '")
            .escaped("o'brien")
            .unwrap()
            .literal("'")
            .build();

        let driver = MockDriver::new();
        assert_eq!(task.render(&driver).unwrap(), "SELECT * FROM users WHERE name = 'o\\'brien'");
    }

    #[test]
    fn test_empty_escape_arg_is_invalid() {
        let result = TaskBuilder::new(Duration::from_secs(1)).escaped("");
        assert!(matches!(result, Err(Error::InvalidArg)));
    }
}
