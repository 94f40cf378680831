use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use super::{ExamState, Operation, Phase, PhaseKind, Result, SessionError, SessionSnapshot};
use crate::assessment::{
    AnswerSheet, AssessmentKind, AssessmentResult, Candidate, Countdown, ExamPayload, Instructions, Question,
    QuestionSet, ResponseSlot, Submission, SubmitTrigger, TickOutcome,
};

/// Progress of one candidate through the assessment wizard.
///
/// Every backend interaction is split in two: a `begin_*`/`claim_*` call
/// validates input, checks the phase and raises the busy flag; a completion
/// call applies the backend's answer. Failures go through [`fail`], which
/// lowers the busy flag and keeps the phase as it was.
///
/// [`fail`]: AssessmentSession::fail
#[derive(Debug)]
pub struct AssessmentSession {
    id: Uuid,
    kind: AssessmentKind,
    default_time_limit: u64,
    candidate: Option<Candidate>,
    instructions: Option<Instructions>,
    phase: Phase,
    busy: bool,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
}

impl AssessmentSession {
    pub fn new(kind: AssessmentKind, default_time_limit: u64) -> Self {
        let id = Uuid::new_v4();
        debug!("🆕 New {} session {}", kind, id);
        Self {
            id,
            kind,
            default_time_limit,
            candidate: None,
            instructions: None,
            phase: Phase::OtpPending { code_sent: false },
            busy: false,
            last_error: None,
            started_at: None,
            submitted_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> AssessmentKind {
        self.kind
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn phase_kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    pub fn questions(&self) -> Option<&QuestionSet> {
        match &self.phase {
            Phase::ExamInProgress(exam) => Some(&exam.questions),
            _ => None,
        }
    }

    pub fn answers(&self) -> Option<&AnswerSheet> {
        match &self.phase {
            Phase::ExamInProgress(exam) => Some(&exam.answers),
            _ => None,
        }
    }

    pub fn time_remaining(&self) -> Option<u64> {
        match &self.phase {
            Phase::ExamInProgress(exam) => Some(exam.countdown.remaining()),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&AssessmentResult> {
        match &self.phase {
            Phase::Submitted { result, .. } => Some(result),
            _ => None,
        }
    }

    fn ensure(&self, operation: Operation) -> Result<()> {
        let phase = self.phase_kind();
        if phase != operation.origin() {
            return Err(SessionError::InvalidPhase { operation, phase });
        }
        if self.busy {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn invalid(&mut self, message: impl Into<String>) -> SessionError {
        let message = message.into();
        self.last_error = Some(message.clone());
        SessionError::Validation(message)
    }

    pub fn begin_request_code(&mut self, name: &str, email: &str) -> Result<Candidate> {
        self.ensure(Operation::RequestCode)?;
        let candidate = Candidate::new(name, email).map_err(|message| self.invalid(message))?;

        self.candidate = Some(candidate.clone());
        self.busy = true;
        self.last_error = None;
        Ok(candidate)
    }

    pub fn code_sent(&mut self) {
        self.busy = false;
        if let Phase::OtpPending { code_sent } = &mut self.phase {
            *code_sent = true;
        }
        info!("📧 Verification code requested for session {}", self.id);
    }

    /// Returns the candidate whose code is being verified.
    pub fn begin_verify(&mut self, code: &str) -> Result<Candidate> {
        self.ensure(Operation::VerifyCode)?;
        if code.trim().is_empty() {
            return Err(self.invalid("Please enter OTP"));
        }
        let candidate = match &self.candidate {
            Some(candidate) => candidate.clone(),
            None => return Err(self.invalid("Please provide name and email")),
        };

        self.busy = true;
        self.last_error = None;
        Ok(candidate)
    }

    pub fn show_instructions(&mut self, instructions: Instructions) -> Result<()> {
        let phase = self.phase_kind();
        if phase != PhaseKind::OtpPending {
            return Err(SessionError::InvalidPhase {
                operation: Operation::VerifyCode,
                phase,
            });
        }
        info!(
            "📋 Instructions for '{}' shown ({} questions)",
            instructions.round_name,
            instructions.total_questions.unwrap_or_default()
        );
        self.instructions = Some(instructions.clone());
        self.phase = Phase::InstructionsShown { instructions };
        self.busy = false;
        Ok(())
    }

    pub fn begin_start_exam(&mut self) -> Result<Candidate> {
        self.ensure(Operation::StartExam)?;
        let candidate = match &self.candidate {
            Some(candidate) => candidate.clone(),
            None => return Err(self.invalid("Please provide name and email")),
        };
        self.busy = true;
        self.last_error = None;
        Ok(candidate)
    }

    /// Enters the exam from the instructions page, or straight after
    /// verification for kinds without one.
    pub fn enter_exam(&mut self, payload: ExamPayload) -> Result<()> {
        let phase = self.phase_kind();
        let declared = match &self.phase {
            Phase::InstructionsShown { instructions } => payload
                .time_limit_seconds
                .filter(|limit| *limit > 0)
                .or(instructions.time_limit_seconds),
            Phase::OtpPending { .. } if !self.kind.shows_instructions() => payload.time_limit_seconds,
            _ => {
                return Err(SessionError::InvalidPhase {
                    operation: Operation::StartExam,
                    phase,
                })
            }
        };

        let time_limit = Countdown::resolve_limit(declared, self.default_time_limit);
        info!(
            "🎬 Exam started for session {}: {} questions, {}s on the clock",
            self.id,
            payload.questions.len(),
            time_limit
        );

        self.phase = Phase::ExamInProgress(ExamState {
            candidate_id: payload.candidate_id,
            questions: payload.questions,
            answers: AnswerSheet::new(),
            countdown: Countdown::new(time_limit),
        });
        self.busy = false;
        self.last_error = None;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Stores a response, replacing any earlier one for the question.
    pub fn record_answer(&mut self, question_id: &str, value: &str) -> Result<Option<String>> {
        let phase = self.phase_kind();
        match &mut self.phase {
            Phase::ExamInProgress(exam) => Ok(exam.answers.record(&exam.questions, question_id, value)?),
            _ => Err(SessionError::InvalidPhase {
                operation: Operation::RecordAnswer,
                phase,
            }),
        }
    }

    /// Looks up a code question for a trial run. Answers and phase stay as
    /// they are and the busy flag is not raised.
    pub fn begin_run_code(&self, question_id: &str) -> Result<(Candidate, Question)> {
        self.ensure(Operation::RunCode)?;
        let (Phase::ExamInProgress(exam), Some(candidate)) = (&self.phase, &self.candidate) else {
            return Err(SessionError::InvalidPhase {
                operation: Operation::RunCode,
                phase: self.phase_kind(),
            });
        };
        let question = exam
            .questions
            .get(question_id)
            .ok_or_else(|| SessionError::Validation(format!("Unknown question '{}'", question_id)))?;
        if !matches!(question.slot, ResponseSlot::Code { .. }) {
            return Err(SessionError::Validation(format!(
                "Question '{}' does not take code",
                question_id
            )));
        }
        debug!("▶️ Running draft for question {} in session {}", question_id, self.id);
        Ok((candidate.clone(), question.clone()))
    }

    /// Advances the countdown by one second. Outside the exam nothing moves.
    pub fn tick(&mut self) -> TickOutcome {
        match &mut self.phase {
            Phase::ExamInProgress(exam) => {
                let outcome = exam.countdown.tick();
                if outcome == TickOutcome::Expired {
                    info!("⏰ Time is up for session {}", self.id);
                }
                outcome
            }
            _ => TickOutcome::Finished,
        }
    }

    /// Claims the one submission of this session.
    ///
    /// Manual submissions without any answer need `confirmed_empty`;
    /// timeout submissions never ask.
    pub fn claim_submission(&mut self, trigger: SubmitTrigger, confirmed_empty: bool) -> Result<Submission> {
        self.ensure(Operation::Submit)?;
        let candidate = match &self.candidate {
            Some(candidate) => candidate.clone(),
            None => return Err(self.invalid("Please provide name and email")),
        };
        let Phase::ExamInProgress(exam) = &self.phase else {
            return Err(SessionError::InvalidPhase {
                operation: Operation::Submit,
                phase: self.phase_kind(),
            });
        };

        if trigger == SubmitTrigger::Manual && exam.answers.is_empty() && !confirmed_empty {
            return Err(SessionError::ConfirmationRequired);
        }

        let submission = Submission {
            kind: self.kind,
            candidate,
            candidate_id: exam.candidate_id,
            questions: exam.questions.clone(),
            answers: exam.answers.clone(),
            trigger,
        };
        self.busy = true;
        self.last_error = None;
        Ok(submission)
    }

    pub fn complete_submission(&mut self, result: AssessmentResult) -> Result<()> {
        let phase = self.phase_kind();
        let (answered, total_questions) = match &self.phase {
            Phase::ExamInProgress(exam) => (exam.answers.len(), exam.questions.len()),
            _ => {
                return Err(SessionError::InvalidPhase {
                    operation: Operation::Submit,
                    phase,
                })
            }
        };

        info!(
            "🏁 Session {} submitted ({}/{} answered): {:?}",
            self.id, answered, total_questions, result.status
        );
        self.phase = Phase::Submitted {
            result,
            answered,
            total_questions,
        };
        self.busy = false;
        self.last_error = None;
        self.submitted_at = Some(Utc::now());
        Ok(())
    }

    /// Records a failed backend interaction. The phase stays where it was.
    pub fn fail(&mut self, error: &SessionError) {
        warn!("⚠️ Session {} ({}): {}", self.id, self.phase_kind(), error);
        self.busy = false;
        self.last_error = Some(error.to_string());
    }

    /// Lowers the busy flag of a call that never completed. Phase, answers
    /// and the countdown stay as they are.
    pub fn abandon(&mut self) {
        if self.busy {
            warn!("⚠️ Session {} ({}): request abandoned before completion", self.id, self.phase_kind());
            self.busy = false;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (timer, answered, total_questions, result) = match &self.phase {
            Phase::ExamInProgress(exam) => (
                Some(exam.countdown.state()),
                exam.answers.len(),
                exam.questions.len(),
                None,
            ),
            Phase::Submitted {
                result,
                answered,
                total_questions,
            } => (None, *answered, *total_questions, Some(result.clone())),
            _ => (None, 0, 0, None),
        };

        SessionSnapshot {
            id: self.id,
            kind: self.kind,
            phase: self.phase_kind(),
            busy: self.busy,
            code_sent: matches!(self.phase, Phase::OtpPending { code_sent: true }),
            candidate: self.candidate.clone(),
            instructions: self.instructions.clone(),
            timer,
            answered,
            total_questions,
            error: self.last_error.clone(),
            result,
            started_at: self.started_at,
            submitted_at: self.submitted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{ChoiceOption, Question, DEFAULT_TIME_LIMIT_SECONDS};

    fn questions() -> QuestionSet {
        let options = ["A", "B", "C", "D"]
            .iter()
            .map(|k| ChoiceOption::new(*k, *k))
            .collect::<Vec<_>>();
        QuestionSet::new(
            (1..=5)
                .map(|i| Question::multiple_choice(i.to_string(), format!("Question {}", i), options.clone()))
                .collect(),
        )
    }

    fn instructions(limit: Option<u64>) -> Instructions {
        Instructions {
            round_name: "Aptitude Test".to_string(),
            time_limit_seconds: limit,
            total_questions: Some(5),
            instructions: None,
        }
    }

    fn payload() -> ExamPayload {
        ExamPayload {
            candidate_id: Some(7),
            questions: questions(),
            time_limit_seconds: None,
        }
    }

    fn in_exam(limit: Option<u64>) -> AssessmentSession {
        let mut session = AssessmentSession::new(AssessmentKind::Aptitude, DEFAULT_TIME_LIMIT_SECONDS);
        session.begin_request_code("Jane Doe", "jane@example.com").unwrap();
        session.code_sent();
        session.begin_verify("123456").unwrap();
        session.show_instructions(instructions(limit)).unwrap();
        session.begin_start_exam().unwrap();
        session.enter_exam(payload()).unwrap();
        session
    }

    #[test]
    fn test_request_code_validation_keeps_phase() {
        let mut session = AssessmentSession::new(AssessmentKind::Aptitude, 1800);
        let err = session.begin_request_code("", "jane@example.com").unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(session.phase_kind(), PhaseKind::OtpPending);
        assert!(!session.is_busy());
        assert_eq!(session.last_error(), Some("Please provide name and email"));
    }

    #[test]
    fn test_busy_rejects_overlapping_requests() {
        let mut session = AssessmentSession::new(AssessmentKind::Aptitude, 1800);
        session.begin_request_code("Jane Doe", "jane@example.com").unwrap();
        assert!(matches!(
            session.begin_request_code("Jane Doe", "jane@example.com"),
            Err(SessionError::Busy)
        ));
        assert!(matches!(session.begin_verify("123456"), Err(SessionError::Busy)));
        session.code_sent();
        assert!(session.snapshot().code_sent);
        assert!(session.begin_verify("123456").is_ok());
    }

    #[test]
    fn test_verify_requires_code_and_candidate() {
        let mut session = AssessmentSession::new(AssessmentKind::Aptitude, 1800);
        assert!(matches!(session.begin_verify("123456"), Err(SessionError::Validation(_))));
        session.begin_request_code("Jane Doe", "jane@example.com").unwrap();
        session.code_sent();
        assert!(matches!(session.begin_verify("   "), Err(SessionError::Validation(_))));
        assert_eq!(session.last_error(), Some("Please enter OTP"));
    }

    #[test]
    fn test_failure_keeps_phase_and_records_error() {
        let mut session = AssessmentSession::new(AssessmentKind::Aptitude, 1800);
        session.begin_request_code("Jane Doe", "jane@example.com").unwrap();
        session.code_sent();
        session.begin_verify("000000").unwrap();
        session.fail(&SessionError::CodeRejected("Invalid OTP".to_string()));

        assert_eq!(session.phase_kind(), PhaseKind::OtpPending);
        assert!(!session.is_busy());
        assert_eq!(session.last_error(), Some("Invalid OTP"));
        session.dismiss_error();
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_start_exam_uses_instruction_limit() {
        let session = in_exam(Some(600));
        assert_eq!(session.time_remaining(), Some(600));
        assert_eq!(session.questions().unwrap().len(), 5);
    }

    #[test]
    fn test_start_exam_falls_back_to_default_limit() {
        let session = in_exam(None);
        assert_eq!(session.time_remaining(), Some(DEFAULT_TIME_LIMIT_SECONDS));
        let session = in_exam(Some(0));
        assert_eq!(session.time_remaining(), Some(DEFAULT_TIME_LIMIT_SECONDS));
    }

    #[test]
    fn test_zero_payload_limit_keeps_instruction_limit() {
        let mut session = AssessmentSession::new(AssessmentKind::Aptitude, DEFAULT_TIME_LIMIT_SECONDS);
        session.begin_request_code("Jane Doe", "jane@example.com").unwrap();
        session.code_sent();
        session.begin_verify("123456").unwrap();
        session.show_instructions(instructions(Some(600))).unwrap();
        session.begin_start_exam().unwrap();
        session
            .enter_exam(ExamPayload {
                time_limit_seconds: Some(0),
                ..payload()
            })
            .unwrap();
        assert_eq!(session.time_remaining(), Some(600));
    }

    #[test]
    fn test_kinds_without_instructions_enter_exam_from_otp() {
        let mut session = AssessmentSession::new(AssessmentKind::Coding, 900);
        session.begin_request_code("Jane Doe", "jane@example.com").unwrap();
        session.code_sent();
        session.begin_verify("123456").unwrap();
        session.enter_exam(payload()).unwrap();
        assert_eq!(session.phase_kind(), PhaseKind::ExamInProgress);
        assert_eq!(session.time_remaining(), Some(900));

        let mut aptitude = AssessmentSession::new(AssessmentKind::Aptitude, 900);
        assert!(matches!(
            aptitude.enter_exam(payload()),
            Err(SessionError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn test_record_answer_keys_stay_within_questions() {
        let mut session = in_exam(None);
        session.record_answer("3", "B").unwrap();
        session.record_answer("3", "C").unwrap();
        assert!(session.record_answer("42", "A").is_err());
        assert!(session.record_answer("1", "Z").is_err());

        let answers = session.answers().unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers.get("3"), Some("C"));
        let ids: Vec<_> = session.questions().unwrap().ids().map(String::from).collect();
        assert!(answers.iter().all(|(id, _)| ids.iter().any(|q| q == id)));
    }

    #[test]
    fn test_record_answer_outside_exam_is_rejected() {
        let mut session = AssessmentSession::new(AssessmentKind::Aptitude, 1800);
        assert!(matches!(
            session.record_answer("1", "A"),
            Err(SessionError::InvalidPhase {
                operation: Operation::RecordAnswer,
                phase: PhaseKind::OtpPending
            })
        ));
    }

    #[test]
    fn test_run_code_needs_a_code_question_in_exam() {
        let fresh = AssessmentSession::new(AssessmentKind::Coding, 1800);
        assert!(matches!(
            fresh.begin_run_code("1"),
            Err(SessionError::InvalidPhase {
                operation: Operation::RunCode,
                phase: PhaseKind::OtpPending
            })
        ));

        let mut session = AssessmentSession::new(AssessmentKind::Coding, 1800);
        session.begin_request_code("Jane Doe", "jane@example.com").unwrap();
        session.code_sent();
        session.begin_verify("123456").unwrap();
        session
            .enter_exam(ExamPayload {
                candidate_id: None,
                questions: QuestionSet::new(vec![
                    Question::code("1", "Two Sum", "python"),
                    Question::free_text("2", "Explain your approach"),
                ]),
                time_limit_seconds: None,
            })
            .unwrap();
        session.record_answer("1", "print(1)").unwrap();

        let (candidate, question) = session.begin_run_code("1").unwrap();
        assert_eq!(candidate.email, "jane@example.com");
        assert_eq!(question.prompt, "Two Sum");
        assert!(!session.is_busy());
        assert_eq!(session.answers().unwrap().get("1"), Some("print(1)"));
        assert_eq!(session.phase_kind(), PhaseKind::ExamInProgress);

        assert!(matches!(session.begin_run_code("2"), Err(SessionError::Validation(_))));
        assert!(matches!(session.begin_run_code("9"), Err(SessionError::Validation(_))));
    }

    #[test]
    fn test_tick_is_monotonic_and_clamped() {
        let mut session = in_exam(Some(3));
        let mut last = session.time_remaining().unwrap();
        let mut expirations = 0;
        for _ in 0..10 {
            if session.tick() == TickOutcome::Expired {
                expirations += 1;
            }
            let now = session.time_remaining().unwrap();
            assert!(now <= last);
            last = now;
        }
        assert_eq!(last, 0);
        assert_eq!(expirations, 1);
    }

    #[test]
    fn test_manual_empty_submission_needs_confirmation() {
        let mut session = in_exam(None);
        assert!(matches!(
            session.claim_submission(SubmitTrigger::Manual, false),
            Err(SessionError::ConfirmationRequired)
        ));
        assert!(!session.is_busy());

        let submission = session.claim_submission(SubmitTrigger::Manual, true).unwrap();
        assert!(submission.answers.is_empty());
        assert_eq!(submission.candidate_id, Some(7));
    }

    #[test]
    fn test_timeout_submission_skips_confirmation() {
        let mut session = in_exam(None);
        let submission = session.claim_submission(SubmitTrigger::Timeout, false).unwrap();
        assert_eq!(submission.trigger, SubmitTrigger::Timeout);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let mut session = in_exam(None);
        session.record_answer("1", "A").unwrap();
        session.claim_submission(SubmitTrigger::Manual, false).unwrap();
        assert!(matches!(
            session.claim_submission(SubmitTrigger::Timeout, true),
            Err(SessionError::Busy)
        ));
    }

    #[test]
    fn test_failed_submission_stays_in_exam() {
        let mut session = in_exam(Some(10));
        session.record_answer("2", "D").unwrap();
        session.claim_submission(SubmitTrigger::Manual, false).unwrap();
        session.tick();
        session.fail(&SessionError::Validation("Failed to submit exam".to_string()));

        assert_eq!(session.phase_kind(), PhaseKind::ExamInProgress);
        assert_eq!(session.time_remaining(), Some(9));
        assert_eq!(session.answers().unwrap().get("2"), Some("D"));
        assert!(session.claim_submission(SubmitTrigger::Manual, false).is_ok());
    }

    #[test]
    fn test_abandoned_claim_can_be_claimed_again() {
        let mut session = in_exam(Some(10));
        session.record_answer("4", "A").unwrap();
        session.claim_submission(SubmitTrigger::Manual, false).unwrap();
        session.abandon();

        assert!(!session.is_busy());
        assert_eq!(session.phase_kind(), PhaseKind::ExamInProgress);
        assert_eq!(session.last_error(), None);
        let submission = session.claim_submission(SubmitTrigger::Manual, false).unwrap();
        assert_eq!(submission.answers.get("4"), Some("A"));
    }

    #[test]
    fn test_submitted_is_terminal() {
        let mut session = in_exam(None);
        session.record_answer("1", "A").unwrap();
        session.claim_submission(SubmitTrigger::Manual, false).unwrap();
        session
            .complete_submission(AssessmentResult {
                score: Some(1.0),
                status: Some("Regret".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(session.phase_kind(), PhaseKind::Submitted);
        assert!(session.record_answer("2", "B").is_err());
        assert!(session.claim_submission(SubmitTrigger::Timeout, true).is_err());
        assert_eq!(session.tick(), TickOutcome::Finished);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.answered, 1);
        assert_eq!(snapshot.total_questions, 5);
        assert_eq!(snapshot.result.unwrap().status.as_deref(), Some("Regret"));
        assert!(snapshot.submitted_at.is_some());
    }
}
