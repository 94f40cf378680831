pub mod machine;
pub mod manager;

pub use machine::*;
pub use manager::*;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::api::ApiError;
use crate::assessment::{
    AnswerError, AnswerSheet, AssessmentKind, AssessmentResult, Candidate, Countdown, Instructions, QuestionSet,
    TimerState,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    OtpPending,
    InstructionsShown,
    ExamInProgress,
    Submitted,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::OtpPending => "otp_pending",
            PhaseKind::InstructionsShown => "instructions_shown",
            PhaseKind::ExamInProgress => "exam_in_progress",
            PhaseKind::Submitted => "submitted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseKind::Submitted)
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ExamState {
    pub candidate_id: Option<i64>,
    pub questions: QuestionSet,
    pub answers: AnswerSheet,
    pub countdown: Countdown,
}

#[derive(Debug, Clone)]
pub enum Phase {
    OtpPending { code_sent: bool },
    InstructionsShown { instructions: Instructions },
    ExamInProgress(ExamState),
    Submitted { result: AssessmentResult, answered: usize, total_questions: usize },
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::OtpPending { .. } => PhaseKind::OtpPending,
            Phase::InstructionsShown { .. } => PhaseKind::InstructionsShown,
            Phase::ExamInProgress(_) => PhaseKind::ExamInProgress,
            Phase::Submitted { .. } => PhaseKind::Submitted,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RequestCode,
    VerifyCode,
    StartExam,
    RecordAnswer,
    RunCode,
    Submit,
}

impl Operation {
    /// The phase an operation starts from.
    pub fn origin(&self) -> PhaseKind {
        match self {
            Operation::RequestCode | Operation::VerifyCode => PhaseKind::OtpPending,
            Operation::StartExam => PhaseKind::InstructionsShown,
            Operation::RecordAnswer | Operation::RunCode | Operation::Submit => PhaseKind::ExamInProgress,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::RequestCode => "request a code",
            Operation::VerifyCode => "verify the code",
            Operation::StartExam => "start the exam",
            Operation::RecordAnswer => "record an answer",
            Operation::RunCode => "run code",
            Operation::Submit => "submit",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("Cannot {operation} in phase {phase}")]
    InvalidPhase { operation: Operation, phase: PhaseKind },
    #[error("Another request is still in progress")]
    Busy,
    #[error("You haven't answered any questions. Submit anyway?")]
    ConfirmationRequired,
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error("{0}")]
    CodeRejected(String),
    #[error(transparent)]
    Backend(#[from] ApiError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Serializable view of a session for rendering.
#[derive(Serialize, Clone, Debug)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub kind: AssessmentKind,
    pub phase: PhaseKind,
    pub busy: bool,
    pub code_sent: bool,
    pub candidate: Option<Candidate>,
    pub instructions: Option<Instructions>,
    pub timer: Option<TimerState>,
    pub answered: usize,
    pub total_questions: usize,
    pub error: Option<String>,
    pub result: Option<AssessmentResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn time_remaining(&self) -> Option<u64> {
        self.timer.map(|t| t.remaining_seconds)
    }
}
