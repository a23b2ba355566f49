//! Task results

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::{Color, Outcome};

const NO_ERROR_MESSAGE: &str = "<No error message>";

/// The result of running one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult<O> {
    /// Name of the task that produced the result
    pub task_name: String,

    /// Parameter description of the task
    #[serde(default)]
    pub parameters: String,

    /// Actual outcome
    pub result: O,

    /// Outcome the task was expected to produce
    pub expected_result: O,

    /// Short human readable reason for the outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Explicit error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Captured standard output
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,

    /// Captured standard error
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,

    /// Error or panic that aborted the task body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,

    /// Wall-clock execution time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<Duration>,

    /// Host that ran the task
    #[serde(default)]
    pub hostname: String,

    /// When the result was produced
    pub finished_at: DateTime<Utc>,

    /// Category specific values, e.g. a calculated fingerprint
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl<O: Outcome> TaskResult<O> {
    /// Create a result for the named task
    pub fn new(task_name: impl Into<String>, result: O, expected_result: O) -> Self {
        Self {
            task_name: task_name.into(),
            parameters: String::new(),
            result,
            expected_result,
            reason: None,
            error_message: None,
            stdout: String::new(),
            stderr: String::new(),
            exception: None,
            elapsed: None,
            hostname: local_hostname(),
            finished_at: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    pub fn with_expected(mut self, expected_result: O) -> Self {
        self.expected_result = expected_result;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: std::time::Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a category specific value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Whether the actual outcome equals the expected one
    pub fn is_expected(&self) -> bool {
        self.result == self.expected_result
    }

    /// The best available error text: the explicit message, then captured
    /// stderr, then the aborting error
    pub fn error_text(&self) -> String {
        if let Some(message) = self.error_message.as_deref().filter(|m| !m.trim().is_empty()) {
            return message.to_string();
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        self.exception
            .clone()
            .unwrap_or_else(|| NO_ERROR_MESSAGE.to_string())
    }

    /// One-line description: colored tag, expectation qualifier, reason and,
    /// for errors, the error text
    pub fn description(&self) -> String {
        let color = self.result.color();
        let mut text = self.result.colored();
        if color != Color::Green {
            if self.is_expected() {
                text.push_str(&Color::Green.paint(" (expected)"));
            } else {
                text.push_str(&Color::Yellow.paint(" (unexpected)"));
            }
        }
        if let Some(reason) = &self.reason {
            text.push_str(&format!(" ({})", reason));
        }
        if self.result == O::ERROR {
            text.push(' ');
            text.push_str(&self.error_text());
        }
        text
    }
}

pub(crate) fn local_hostname() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{BuildOutcome, TestOutcome};

    fn plain(text: String) -> String {
        console::strip_ansi_codes(&text).into_owned()
    }

    #[test]
    fn test_expected_is_derived_from_tags() {
        let result = TaskResult::new("t", TestOutcome::Fail, TestOutcome::Fail);
        assert!(result.is_expected());

        let result = TaskResult::new("t", TestOutcome::Fail, TestOutcome::Pass);
        assert!(!result.is_expected());
    }

    #[test]
    fn test_description_of_nominal_result() {
        let result = TaskResult::new("t", TestOutcome::Pass, TestOutcome::Pass);
        assert_eq!(plain(result.description()), "PASS");
    }

    #[test]
    fn test_description_qualifiers() {
        let unexpected = TaskResult::new("t", TestOutcome::Fail, TestOutcome::Pass)
            .with_reason("Fingerprint mismatch");
        assert_eq!(
            plain(unexpected.description()),
            "FAIL (unexpected) (Fingerprint mismatch)"
        );

        let expected = TaskResult::new("t", TestOutcome::Skip, TestOutcome::Skip);
        assert_eq!(plain(expected.description()), "SKIP (expected)");
    }

    #[test]
    fn test_error_text_fallbacks() {
        let explicit = TaskResult::new("t", BuildOutcome::Error, BuildOutcome::Done)
            .with_error_message("boom")
            .with_output("", "stderr text");
        assert_eq!(explicit.error_text(), "boom");

        let from_stderr = TaskResult::new("t", BuildOutcome::Error, BuildOutcome::Done)
            .with_output("", "  stderr text\n");
        assert_eq!(from_stderr.error_text(), "stderr text");

        let from_exception = TaskResult::new("t", BuildOutcome::Error, BuildOutcome::Done)
            .with_exception("task panicked: oops");
        assert_eq!(from_exception.error_text(), "task panicked: oops");

        let nothing = TaskResult::new("t", BuildOutcome::Error, BuildOutcome::Done);
        assert_eq!(nothing.error_text(), "<No error message>");
        assert_eq!(
            plain(nothing.description()),
            "ERROR (unexpected) <No error message>"
        );
    }

    #[test]
    fn test_serde_roundtrip_keeps_attributes() {
        let result = TaskResult::new("fingerprint test", TestOutcome::Fail, TestOutcome::Pass)
            .with_reason("Fingerprint mismatch")
            .with_attribute("calculated_fingerprint", "1234-abcd")
            .with_elapsed(Duration::from_millis(1500));
        let json = serde_json::to_string(&result).unwrap();
        let parsed: TaskResult<TestOutcome> = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.result, TestOutcome::Fail);
        assert_eq!(parsed.expected_result, TestOutcome::Pass);
        assert_eq!(parsed.attribute("calculated_fingerprint"), Some("1234-abcd"));
        assert_eq!(parsed.elapsed, Some(Duration::from_millis(1500)));
    }
}
