use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;

use super::{
    AssessmentBackend, AssessmentKind, AssessmentResult, Candidate, ChoiceOption, ExamPayload, Instructions, Question,
    QuestionSet, ResponseSlot, RunOutput, Submission, Verification,
};
use crate::api::ApiError;

pub const FAKE_CODE: &str = "123456";

/// In-memory backend for offline runs and tests. Counts every call and
/// keeps the submissions it receives.
pub struct FakeBackend {
    pub kind: AssessmentKind,
    pub valid_code: String,
    pub instructions: Instructions,
    pub questions: QuestionSet,
    pub result: AssessmentResult,
    pub send_calls: AtomicU64,
    pub verify_calls: AtomicU64,
    pub instructions_calls: AtomicU64,
    pub start_calls: AtomicU64,
    pub submit_calls: AtomicU64,
    pub run_calls: AtomicU64,
    pub fail_send: AtomicBool,
    pub fail_submit: AtomicBool,
    pub submit_delay: Duration,
    pub submissions: Mutex<Vec<Submission>>,
}

impl FakeBackend {
    pub fn new(kind: AssessmentKind, questions: QuestionSet) -> Self {
        Self {
            kind,
            valid_code: FAKE_CODE.to_string(),
            instructions: Instructions {
                round_name: kind.round_name().to_string(),
                time_limit_seconds: Some(1800),
                total_questions: Some(questions.len() as u32),
                instructions: Some("Answer every question before the timer runs out.".to_string()),
            },
            questions,
            result: AssessmentResult {
                score: Some(0.0),
                status: Some("Regret".to_string()),
                ..Default::default()
            },
            send_calls: AtomicU64::new(0),
            verify_calls: AtomicU64::new(0),
            instructions_calls: AtomicU64::new(0),
            start_calls: AtomicU64::new(0),
            submit_calls: AtomicU64::new(0),
            run_calls: AtomicU64::new(0),
            fail_send: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            submit_delay: Duration::ZERO,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// A short sample round for `take --offline`.
    pub fn demo(kind: AssessmentKind) -> Self {
        let abcd = |labels: [&str; 4]| {
            ["A", "B", "C", "D"]
                .iter()
                .zip(labels)
                .map(|(k, l)| ChoiceOption::new(*k, l))
                .collect::<Vec<_>>()
        };
        let questions = match kind {
            AssessmentKind::Aptitude => vec![
                Question::multiple_choice("1", "What is 15% of 200?", abcd(["15", "30", "45", "20"])),
                Question::multiple_choice("2", "Next in the series 2, 6, 12, 20, ?", abcd(["28", "30", "32", "24"])),
                Question::multiple_choice(
                    "3",
                    "A train covers 120 km in 2 hours. Its speed in km/h is?",
                    abcd(["40", "50", "60", "70"]),
                ),
            ],
            AssessmentKind::Coding => vec![
                Question::code("1", "Reverse a string", "python").with_context("Return the input string reversed."),
                Question::code("2", "FizzBuzz", "python").with_context("Print 1..=15 replacing multiples of 3 and 5."),
            ],
            AssessmentKind::Communication => vec![
                Question::free_text("writing", "Write a short note to a teammate about a delayed release."),
                Question::multiple_choice(
                    "0",
                    "What moved to Friday?",
                    vec![ChoiceOption::new("The meeting", "The meeting"), ChoiceOption::new("The launch", "The launch")],
                )
                .with_context("The weekly meeting moved to Friday; the launch stays on Monday."),
            ],
        };
        Self::new(kind, QuestionSet::new(questions))
    }

    pub fn with_result(mut self, result: AssessmentResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_time_limit(mut self, seconds: Option<u64>) -> Self {
        self.instructions.time_limit_seconds = seconds;
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn submit_count(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> u64 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> u64 {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn last_submission(&self) -> Option<Submission> {
        self.submissions.lock().last().cloned()
    }
}

#[async_trait]
impl AssessmentBackend for FakeBackend {
    fn kind(&self) -> AssessmentKind {
        self.kind
    }

    async fn send_code(&self, candidate: &Candidate) -> Result<(), ApiError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ApiError::Backend {
                status: 503,
                detail: "Failed to send OTP".to_string(),
            });
        }
        info!("📧 [offline] code for {} is {}", candidate.email, self.valid_code);
        Ok(())
    }

    async fn verify_code(&self, _email: &str, code: &str) -> Result<Verification, ApiError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if code == self.valid_code {
            Ok(Verification::accepted())
        } else {
            Err(ApiError::Backend {
                status: 400,
                detail: "Invalid OTP".to_string(),
            })
        }
    }

    async fn fetch_instructions(&self) -> Result<Instructions, ApiError> {
        self.instructions_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.instructions.clone())
    }

    async fn start_exam(&self, candidate: &Candidate) -> Result<ExamPayload, ApiError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExamPayload {
            candidate_id: Some(candidate.provisional_student_id()),
            questions: self.questions.clone(),
            time_limit_seconds: if self.kind.shows_instructions() {
                None
            } else {
                self.instructions.time_limit_seconds
            },
        })
    }

    async fn run_code(&self, _candidate: &Candidate, question: &Question, code: &str) -> Result<RunOutput, ApiError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        let ResponseSlot::Code { language, .. } = &question.slot else {
            return Err(ApiError::Backend {
                status: 404,
                detail: format!("The {} round has no code runner", self.kind),
            });
        };
        let lines = code.lines().filter(|line| !line.trim().is_empty()).count();
        Ok(RunOutput {
            success: lines > 0,
            output: if lines == 0 {
                "No output".to_string()
            } else {
                format!("[offline] ran {} line(s) of {}", lines, language)
            },
        })
    }

    async fn submit_answers(&self, submission: &Submission) -> Result<AssessmentResult, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        self.submissions.lock().push(submission.clone());
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ApiError::Backend {
                status: 500,
                detail: "Failed to submit exam".to_string(),
            });
        }
        Ok(self.result.clone())
    }
}
