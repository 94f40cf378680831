use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AnswerSheet, AssessmentResult, Candidate, Question, QuestionSet};
use crate::api::ApiError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Aptitude,
    Coding,
    Communication,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentKind::Aptitude => "aptitude",
            AssessmentKind::Coding => "coding",
            AssessmentKind::Communication => "communication",
        }
    }

    /// Only the aptitude round shows an instructions page before the exam.
    pub fn shows_instructions(&self) -> bool {
        matches!(self, AssessmentKind::Aptitude)
    }

    pub fn round_name(&self) -> &'static str {
        match self {
            AssessmentKind::Aptitude => "Aptitude Test",
            AssessmentKind::Coding => "Coding Test",
            AssessmentKind::Communication => "Communication Test",
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aptitude" => Ok(AssessmentKind::Aptitude),
            "coding" => Ok(AssessmentKind::Coding),
            "communication" | "comm" => Ok(AssessmentKind::Communication),
            other => Err(format!("Unknown assessment kind: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
    pub reason: Option<String>,
}

impl Verification {
    pub fn accepted() -> Self {
        Self {
            verified: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Instructions {
    pub round_name: String,
    pub time_limit_seconds: Option<u64>,
    pub total_questions: Option<u32>,
    pub instructions: Option<String>,
}

/// What the backend hands over when the exam starts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExamPayload {
    /// Backend-assigned candidate id, when the kind uses one.
    pub candidate_id: Option<i64>,
    pub questions: QuestionSet,
    pub time_limit_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    Timeout,
}

/// Everything needed for the one-shot submission call. Taken under the
/// session lock, so the answers are frozen at claim time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Submission {
    pub kind: AssessmentKind,
    pub candidate: Candidate,
    pub candidate_id: Option<i64>,
    pub questions: QuestionSet,
    pub answers: AnswerSheet,
    pub trigger: SubmitTrigger,
}

/// Outcome of running a draft solution. Nothing is recorded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RunOutput {
    pub success: bool,
    pub output: String,
}

/// The external service that issues codes, hands out questions and scores
/// submissions. The session never computes any of that itself.
#[async_trait]
pub trait AssessmentBackend: Send + Sync {
    fn kind(&self) -> AssessmentKind;

    async fn send_code(&self, candidate: &Candidate) -> Result<(), ApiError>;

    async fn verify_code(&self, email: &str, code: &str) -> Result<Verification, ApiError>;

    async fn fetch_instructions(&self) -> Result<Instructions, ApiError>;

    async fn start_exam(&self, candidate: &Candidate) -> Result<ExamPayload, ApiError>;

    /// Runs a draft against the code runner. Only the coding round has one.
    async fn run_code(&self, candidate: &Candidate, question: &Question, code: &str) -> Result<RunOutput, ApiError>;

    async fn submit_answers(&self, submission: &Submission) -> Result<AssessmentResult, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Aptitude".parse::<AssessmentKind>().unwrap(), AssessmentKind::Aptitude);
        assert_eq!("comm".parse::<AssessmentKind>().unwrap(), AssessmentKind::Communication);
        assert!("typing".parse::<AssessmentKind>().is_err());
    }

    #[test]
    fn test_only_aptitude_shows_instructions() {
        assert!(AssessmentKind::Aptitude.shows_instructions());
        assert!(!AssessmentKind::Coding.shows_instructions());
        assert!(!AssessmentKind::Communication.shows_instructions());
    }
}
