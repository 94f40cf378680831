use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::QuestionSet;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnswerError {
    #[error("Unknown question: {0}")]
    UnknownQuestion(String),
    #[error("'{option}' is not an option for question {question}")]
    InvalidOption { question: String, option: String },
}

/// Responses keyed by question id. Keys always belong to the question set
/// the sheet was recorded against.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct AnswerSheet {
    answers: HashMap<String, String>,
}

impl AnswerSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a response, replacing any earlier one for the same question.
    /// Returns the replaced value.
    pub fn record(
        &mut self,
        questions: &QuestionSet,
        question_id: &str,
        value: impl Into<String>,
    ) -> Result<Option<String>, AnswerError> {
        let question = questions
            .get(question_id)
            .ok_or_else(|| AnswerError::UnknownQuestion(question_id.to_string()))?;

        let value = value.into();
        if !question.accepts_option(&value) {
            return Err(AnswerError::InvalidOption {
                question: question_id.to_string(),
                option: value,
            });
        }

        Ok(self.answers.insert(question_id.to_string(), value))
    }

    pub fn get(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.answers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.answers
    }
}

/// Verdict returned by the backend after submission.
///
/// Aptitude answers `{score, status}`, communication answers
/// `{total_score, max_score, passed}` and coding answers
/// `{status, link?, message?}`; all of them land here.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AssessmentResult {
    #[serde(default, alias = "total_score")]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Qualification {
    Qualified,
    NotQualified,
    Undetermined,
}

impl AssessmentResult {
    /// Reads the backend's own verdict; nothing is recomputed from the score.
    pub fn qualification(&self) -> Qualification {
        if let Some(passed) = self.passed {
            return if passed { Qualification::Qualified } else { Qualification::NotQualified };
        }
        match self.status.as_deref().map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "qualified" || s == "manager_round" || s == "passed" => Qualification::Qualified,
            Some(s) if s == "regret" || s == "failed" || s == "rejected" => Qualification::NotQualified,
            _ => Qualification::Undetermined,
        }
    }

    pub fn view(&self) -> ResultView<'_> {
        ResultView { result: self }
    }
}

/// Read-only rendering of a result for the terminal.
pub struct ResultView<'a> {
    result: &'a AssessmentResult,
}

impl fmt::Display for ResultView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.result;
        let headline = match r.qualification() {
            Qualification::Qualified => "✅ Qualified",
            Qualification::NotQualified => "❌ Not qualified",
            Qualification::Undetermined => "📨 Submitted",
        };
        writeln!(f, "{}", headline)?;

        match (r.score, r.max_score) {
            (Some(score), Some(max)) => writeln!(f, "Score: {} / {}", format_number(score), format_number(max))?,
            (Some(score), None) => writeln!(f, "Score: {}", format_number(score))?,
            _ => {}
        }
        if let Some(status) = &r.status {
            writeln!(f, "Status: {}", status)?;
        }
        if let Some(link) = &r.link {
            writeln!(f, "Next round: {}", link)?;
        }
        if let Some(message) = &r.message {
            writeln!(f, "{}", message)?;
        }
        Ok(())
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
