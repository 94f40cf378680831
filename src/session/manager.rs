use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::{AssessmentSession, PhaseKind, Result, SessionError, SessionSnapshot};
use crate::api::ApiError;
use crate::assessment::{
    AssessmentBackend, AssessmentResult, Candidate, QuestionSet, RunOutput, SubmitTrigger, TickControl, TickOutcome, Ticker, DEFAULT_TIME_LIMIT_SECONDS,
};

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Used when the backend does not declare a positive time limit.
    pub default_time_limit: u64,
    /// Wall-clock length of one countdown second.
    pub tick_period: Duration,
    /// Spawn the countdown ticker when the exam starts. Off means the
    /// owner drives [`SessionController::tick`] itself.
    pub auto_tick: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            default_time_limit: DEFAULT_TIME_LIMIT_SECONDS,
            tick_period: Duration::from_secs(1),
            auto_tick: true,
        }
    }
}

/// Held across a backend call that raised the busy flag. Dropping it
/// while still armed means the call was cancelled mid-flight.
struct InFlight<'a> {
    session: &'a Mutex<AssessmentSession>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(session: &'a Mutex<AssessmentSession>) -> Self {
        Self { session, armed: true }
    }

    fn finish(mut self) {
        self.armed = false;
    }

    fn fail(mut self, err: SessionError) -> SessionError {
        self.armed = false;
        self.session.lock().fail(&err);
        err
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.lock().abandon();
        }
    }
}

struct Shared<B: ?Sized> {
    backend: Arc<B>,
    session: Mutex<AssessmentSession>,
}

impl<B: AssessmentBackend + ?Sized> Shared<B> {
    fn in_flight(&self) -> InFlight<'_> {
        InFlight::new(&self.session)
    }

    async fn submit(&self, trigger: SubmitTrigger, confirmed_empty: bool) -> Result<AssessmentResult> {
        let submission = self.session.lock().claim_submission(trigger, confirmed_empty)?;
        info!(
            "📤 Submitting {} answers ({:?})",
            submission.answers.len(),
            submission.trigger
        );

        let flight = self.in_flight();
        match self.backend.submit_answers(&submission).await {
            Ok(result) => {
                flight.finish();
                self.session.lock().complete_submission(result.clone())?;
                Ok(result)
            }
            Err(e) => {
                error!("❌ Submission failed: {}", e);
                Err(flight.fail(e.into()))
            }
        }
    }

    async fn tick(&self) -> TickControl {
        let outcome = self.session.lock().tick();
        match outcome {
            TickOutcome::Running(_) => TickControl::Continue,
            TickOutcome::Expired => {
                match self.submit(SubmitTrigger::Timeout, true).await {
                    Ok(_) => info!("⏰ Exam submitted automatically on timeout"),
                    // A manual submission already holds the claim.
                    Err(SessionError::Busy) => debug!("Timeout reached while a submission is in flight"),
                    Err(e) => warn!("⚠️ Automatic submission failed: {}", e),
                }
                TickControl::Stop
            }
            TickOutcome::Finished => TickControl::Stop,
        }
    }
}

/// Drives one [`AssessmentSession`] against a backend.
///
/// All methods take `&self`; the session sits behind a lock that is never
/// held across a backend call. While the exam runs a [`Ticker`] counts
/// down and submits on expiry. Dropping the controller stops it.
pub struct SessionController<B: AssessmentBackend + ?Sized + 'static> {
    shared: Arc<Shared<B>>,
    options: ControllerOptions,
    ticker: Mutex<Option<Ticker>>,
}

impl<B: AssessmentBackend + ?Sized + 'static> SessionController<B> {
    pub fn new(backend: Arc<B>, options: ControllerOptions) -> Self {
        let session = AssessmentSession::new(backend.kind(), options.default_time_limit);
        info!("🎯 Session {} created for the {} round", session.id(), session.kind());
        Self {
            shared: Arc::new(Shared {
                backend,
                session: Mutex::new(session),
            }),
            options,
            ticker: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.session.lock().snapshot()
    }

    pub fn phase(&self) -> PhaseKind {
        self.shared.session.lock().phase_kind()
    }

    /// The question set while the exam runs.
    pub fn questions(&self) -> Option<QuestionSet> {
        self.shared.session.lock().questions().cloned()
    }

    pub fn dismiss_error(&self) {
        self.shared.session.lock().dismiss_error();
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.lock().as_ref().map_or(false, |t| !t.is_finished())
    }

    pub async fn request_code(&self, name: &str, email: &str) -> Result<()> {
        let candidate = self.shared.session.lock().begin_request_code(name, email)?;
        info!("📧 Requesting verification code for {}", candidate.email);

        let flight = self.shared.in_flight();
        match self.shared.backend.send_code(&candidate).await {
            Ok(()) => {
                flight.finish();
                self.shared.session.lock().code_sent();
                Ok(())
            }
            Err(e) => Err(flight.fail(e.into())),
        }
    }

    /// Verifies the code and moves on: to the instructions page for rounds
    /// that have one, otherwise straight into the exam.
    pub async fn verify_code(&self, code: &str) -> Result<PhaseKind> {
        let candidate = self.shared.session.lock().begin_verify(code)?;
        let code = code.trim();

        // Spans every backend call until the phase moves on.
        let flight = self.shared.in_flight();
        let verification = match self.shared.backend.verify_code(&candidate.email, code).await {
            Ok(v) => v,
            Err(ApiError::Backend { status, detail }) if (400..500).contains(&status) => {
                return Err(flight.fail(SessionError::CodeRejected(detail)));
            }
            Err(e) => return Err(flight.fail(e.into())),
        };
        if !verification.verified {
            let reason = verification.reason.unwrap_or_else(|| "Invalid OTP".to_string());
            return Err(flight.fail(SessionError::CodeRejected(reason)));
        }
        info!("✅ Code verified for {}", candidate.email);

        if self.shared.backend.kind().shows_instructions() {
            let instructions = match self.shared.backend.fetch_instructions().await {
                Ok(instructions) => instructions,
                Err(e) => return Err(flight.fail(e.into())),
            };
            flight.finish();
            self.shared.session.lock().show_instructions(instructions)?;
            Ok(PhaseKind::InstructionsShown)
        } else {
            self.load_exam(&candidate, flight).await?;
            Ok(PhaseKind::ExamInProgress)
        }
    }

    pub async fn start_exam(&self) -> Result<()> {
        let candidate = self.shared.session.lock().begin_start_exam()?;
        self.load_exam(&candidate, self.shared.in_flight()).await
    }

    async fn load_exam(&self, candidate: &Candidate, flight: InFlight<'_>) -> Result<()> {
        let payload = match self.shared.backend.start_exam(candidate).await {
            Ok(payload) => payload,
            Err(e) => return Err(flight.fail(e.into())),
        };
        flight.finish();
        self.shared.session.lock().enter_exam(payload)?;
        if self.options.auto_tick {
            self.start_ticker();
        }
        Ok(())
    }

    fn start_ticker(&self) {
        let shared = Arc::clone(&self.shared);
        let ticker = Ticker::spawn(self.options.tick_period, move || {
            let shared = Arc::clone(&shared);
            async move { shared.tick().await }
        });
        *self.ticker.lock() = Some(ticker);
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.cancel();
        }
    }

    pub fn record_answer(&self, question_id: &str, value: &str) -> Result<()> {
        let previous = self.shared.session.lock().record_answer(question_id, value)?;
        if previous.is_some() {
            debug!("✏️ Answer for question {} replaced", question_id);
        }
        Ok(())
    }

    /// Runs a draft solution on the backend. Nothing is recorded and the
    /// session does not move, whatever the runner answers.
    pub async fn run_code(&self, question_id: &str, code: &str) -> Result<RunOutput> {
        let (candidate, question) = self.shared.session.lock().begin_run_code(question_id)?;
        match self.shared.backend.run_code(&candidate, &question, code).await {
            Ok(output) => {
                info!("▶️ Ran draft for question {} (success: {})", question_id, output.success);
                Ok(output)
            }
            Err(e) => {
                warn!("⚠️ Code run for question {} failed: {}", question_id, e);
                Err(e.into())
            }
        }
    }

    /// Submits on the candidate's request. An empty answer sheet needs
    /// `confirmed_empty`.
    pub async fn submit(&self, confirmed_empty: bool) -> Result<AssessmentResult> {
        let result = self.shared.submit(SubmitTrigger::Manual, confirmed_empty).await?;
        self.stop_ticker();
        Ok(result)
    }

    /// Advances the countdown by one second, submitting on expiry.
    pub async fn tick(&self) -> TickControl {
        self.shared.tick().await
    }

    pub fn teardown(&self) {
        self.stop_ticker();
        debug!("🧹 Session {} torn down", self.snapshot().id);
    }
}

impl<B: AssessmentBackend + ?Sized + 'static> Drop for SessionController<B> {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{AssessmentKind, FakeBackend};

    fn manual() -> ControllerOptions {
        ControllerOptions {
            auto_tick: false,
            ..Default::default()
        }
    }

    async fn ready(controller: &SessionController<FakeBackend>) {
        controller.request_code("Jane Doe", "jane@example.com").await.unwrap();
        controller.verify_code("123456").await.unwrap();
        controller.start_exam().await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_code_stays_pending() {
        let backend = Arc::new(FakeBackend::demo(AssessmentKind::Aptitude));
        let controller = SessionController::new(backend.clone(), manual());
        controller.request_code("Jane Doe", "jane@example.com").await.unwrap();

        let err = controller.verify_code("000000").await.unwrap_err();
        assert!(matches!(err, SessionError::CodeRejected(_)));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, PhaseKind::OtpPending);
        assert_eq!(snapshot.error.as_deref(), Some("Invalid OTP"));
        assert_eq!(backend.instructions_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(backend.start_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_is_reported() {
        let backend = Arc::new(FakeBackend::demo(AssessmentKind::Aptitude));
        backend.fail_send.store(true, std::sync::atomic::Ordering::SeqCst);
        let controller = SessionController::new(backend, manual());

        assert!(controller.request_code("Jane Doe", "jane@example.com").await.is_err());
        let snapshot = controller.snapshot();
        assert!(!snapshot.code_sent);
        assert!(!snapshot.busy);
        assert_eq!(snapshot.error.as_deref(), Some("Failed to send OTP"));
    }

    #[tokio::test]
    async fn test_coding_round_skips_instructions() {
        let backend = Arc::new(FakeBackend::demo(AssessmentKind::Coding));
        let controller = SessionController::new(backend, manual());
        controller.request_code("Jane Doe", "jane@example.com").await.unwrap();

        let phase = controller.verify_code("123456").await.unwrap();
        assert_eq!(phase, PhaseKind::ExamInProgress);
        assert_eq!(controller.snapshot().time_remaining(), Some(1800));
    }

    #[tokio::test]
    async fn test_manual_tick_expiry_submits_once() {
        let backend = Arc::new(FakeBackend::demo(AssessmentKind::Aptitude).with_time_limit(Some(3)));
        let controller = SessionController::new(backend.clone(), manual());
        ready(&controller).await;

        assert_eq!(controller.tick().await, TickControl::Continue);
        assert_eq!(controller.tick().await, TickControl::Continue);
        assert_eq!(controller.tick().await, TickControl::Stop);
        assert_eq!(controller.tick().await, TickControl::Stop);

        assert_eq!(backend.submit_count(), 1);
        assert_eq!(controller.phase(), PhaseKind::Submitted);
        assert_eq!(backend.last_submission().unwrap().trigger, SubmitTrigger::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_submit_releases_the_session() {
        let backend = Arc::new(
            FakeBackend::demo(AssessmentKind::Aptitude)
                .with_time_limit(Some(10))
                .with_submit_delay(Duration::from_secs(30)),
        );
        let controller = SessionController::new(backend.clone(), manual());
        ready(&controller).await;
        controller.record_answer("1", "B").unwrap();

        let cancelled = tokio::time::timeout(Duration::from_secs(1), controller.submit(false)).await;
        assert!(cancelled.is_err());
        let snapshot = controller.snapshot();
        assert!(!snapshot.busy);
        assert_eq!(snapshot.phase, PhaseKind::ExamInProgress);

        // Expiry still submits once the cancelled call is gone.
        for _ in 0..9 {
            assert_eq!(controller.tick().await, TickControl::Continue);
        }
        assert_eq!(controller.tick().await, TickControl::Stop);

        assert_eq!(controller.phase(), PhaseKind::Submitted);
        let submission = backend.last_submission().unwrap();
        assert_eq!(submission.trigger, SubmitTrigger::Timeout);
        assert_eq!(submission.answers.get("1"), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_after_manual_submit() {
        let backend = Arc::new(FakeBackend::demo(AssessmentKind::Aptitude));
        let controller = SessionController::new(backend.clone(), ControllerOptions::default());
        ready(&controller).await;
        assert!(controller.is_ticking());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(controller.snapshot().time_remaining(), Some(1798));

        controller.record_answer("1", "B").unwrap();
        controller.submit(false).await.unwrap();
        assert!(!controller.is_ticking());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(backend.submit_count(), 1);
    }
}
