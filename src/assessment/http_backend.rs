use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    AssessmentBackend, AssessmentKind, AssessmentResult, Candidate, ChoiceOption, ExamPayload, Instructions, Question,
    QuestionSet, ResponseSlot, RunOutput, Submission, Verification,
};
use crate::api::{ApiClient, ApiError};

/// Route set of one assessment kind on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routes {
    pub send_code: &'static str,
    pub verify_code: &'static str,
    pub instructions: Option<&'static str>,
    pub questions: &'static str,
    pub submit: &'static str,
    pub finalize: Option<&'static str>,
    pub run_code: Option<&'static str>,
}

impl Routes {
    pub fn for_kind(kind: AssessmentKind) -> Self {
        match kind {
            AssessmentKind::Aptitude => Routes {
                send_code: "/api/assessment/aptitude/send",
                verify_code: "/api/assessment/aptitude/verify",
                instructions: Some("/api/assessment/aptitude/instructions"),
                questions: "/api/assessment/aptitude/start",
                submit: "/api/assessment/aptitude/submit",
                finalize: None,
                run_code: None,
            },
            AssessmentKind::Coding => Routes {
                send_code: "/coding/send-otp",
                verify_code: "/coding/verify-otp",
                instructions: None,
                questions: "/coding/questions",
                submit: "/coding/submit",
                finalize: Some("/coding/finalize"),
                run_code: Some("/coding/run_code"),
            },
            AssessmentKind::Communication => Routes {
                send_code: "/comm/send-otp",
                verify_code: "/comm/verify-otp",
                instructions: None,
                questions: "/comm/exam",
                submit: "/comm/submit",
                finalize: None,
                run_code: None,
            },
        }
    }
}

#[derive(Serialize)]
struct CodeRequest<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    otp: &'a str,
}

#[derive(Deserialize, Default)]
struct VerifyResponse {
    verified: Option<bool>,
    reason: Option<String>,
}

#[derive(Serialize)]
struct AptitudeStartRequest<'a> {
    student_id: i64,
    email: &'a str,
}

#[derive(Deserialize)]
struct AptitudeQuestion {
    no: i64,
    question: String,
    options: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct AptitudeStartResponse {
    #[serde(default)]
    questions: Vec<AptitudeQuestion>,
    candidate_id: Option<i64>,
}

#[derive(Serialize)]
struct AptitudeSubmitRequest<'a> {
    student_id: i64,
    answers: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct CodingQuestion {
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct CodingQuestionsResponse {
    #[serde(default)]
    questions: Vec<CodingQuestion>,
}

#[derive(Serialize)]
struct CodingSubmitRequest<'a> {
    name: &'a str,
    email: &'a str,
    question_title: &'a str,
    language: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct CodingSubmitResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
struct RunCodeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    output: String,
}

#[derive(Deserialize)]
struct CommMcq {
    question: String,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Deserialize, Default)]
struct CommExam {
    #[serde(default)]
    reading_paragraph: Option<String>,
    #[serde(default)]
    reading_mcqs: Vec<CommMcq>,
    #[serde(default)]
    writing_prompt: Option<String>,
    #[serde(default)]
    listening_paragraph: Option<String>,
}

#[derive(Deserialize)]
struct CommExamResponse {
    #[serde(default)]
    exam: CommExam,
}

#[derive(Serialize)]
struct CommSubmitRequest<'a> {
    name: &'a str,
    email: &'a str,
    writing_answer: &'a str,
    listening_answer: &'a str,
    mcq_answers: BTreeMap<&'a str, &'a str>,
}

pub const WRITING_QUESTION_ID: &str = "writing";
pub const LISTENING_QUESTION_ID: &str = "listening";

/// [`AssessmentBackend`] over the REST API, one instance per assessment kind.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    api: ApiClient,
    kind: AssessmentKind,
    routes: Routes,
    coding_language: String,
}

impl HttpBackend {
    pub fn new(api: ApiClient, kind: AssessmentKind) -> Self {
        Self {
            api,
            kind,
            routes: Routes::for_kind(kind),
            coding_language: "python".to_string(),
        }
    }

    pub fn with_coding_language(mut self, language: impl Into<String>) -> Self {
        self.coding_language = language.into();
        self
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    async fn start_aptitude(&self, candidate: &Candidate) -> Result<ExamPayload, ApiError> {
        let request = AptitudeStartRequest {
            student_id: candidate.provisional_student_id(),
            email: &candidate.email,
        };
        let response: AptitudeStartResponse = self.api.post(self.routes.questions, &request).await?;
        Ok(ExamPayload {
            candidate_id: response.candidate_id.or(Some(request.student_id)),
            questions: aptitude_questions(response.questions),
            time_limit_seconds: None,
        })
    }

    async fn start_coding(&self) -> Result<ExamPayload, ApiError> {
        let response: CodingQuestionsResponse = self.api.get(self.routes.questions).await?;
        Ok(ExamPayload {
            candidate_id: None,
            questions: coding_questions(response.questions, &self.coding_language),
            time_limit_seconds: None,
        })
    }

    async fn start_communication(&self, candidate: &Candidate) -> Result<ExamPayload, ApiError> {
        let query = [("name", candidate.name.as_str()), ("email", candidate.email.as_str())];
        let response: CommExamResponse = self.api.get_with_query(self.routes.questions, &query).await?;
        Ok(ExamPayload {
            candidate_id: None,
            questions: communication_questions(response.exam),
            time_limit_seconds: None,
        })
    }

    async fn submit_aptitude(&self, submission: &Submission) -> Result<AssessmentResult, ApiError> {
        self.api.post(self.routes.submit, &aptitude_submit_body(submission)).await
    }

    async fn submit_coding(&self, submission: &Submission) -> Result<AssessmentResult, ApiError> {
        for request in coding_submit_bodies(submission, &self.coding_language) {
            let response: CodingSubmitResponse = self.api.post(self.routes.submit, &request).await?;
            if !response.success {
                warn!("⚠️ Solution for '{}' did not pass on the backend", request.question_title);
            }
        }

        let finalize = self.routes.finalize.unwrap_or("/coding/finalize");
        let request = CodeRequest {
            name: &submission.candidate.name,
            email: &submission.candidate.email,
        };
        self.api.post(finalize, &request).await
    }

    async fn submit_communication(&self, submission: &Submission) -> Result<AssessmentResult, ApiError> {
        self.api.post(self.routes.submit, &communication_submit_body(submission)).await
    }
}

fn aptitude_submit_body(submission: &Submission) -> AptitudeSubmitRequest<'_> {
    AptitudeSubmitRequest {
        student_id: submission
            .candidate_id
            .unwrap_or_else(|| submission.candidate.provisional_student_id()),
        answers: submission.answers.as_map(),
    }
}

fn question_language<'a>(question: &'a Question, fallback: &'a str) -> &'a str {
    match &question.slot {
        ResponseSlot::Code { language, .. } => language.as_str(),
        _ => fallback,
    }
}

/// One `/coding/submit` body per answered question, in question order.
fn coding_submit_bodies<'a>(submission: &'a Submission, fallback_language: &'a str) -> Vec<CodingSubmitRequest<'a>> {
    submission
        .questions
        .iter()
        .filter_map(|question| {
            let code = submission.answers.get(&question.id)?;
            Some(CodingSubmitRequest {
                name: &submission.candidate.name,
                email: &submission.candidate.email,
                question_title: &question.prompt,
                language: question_language(question, fallback_language),
                code,
            })
        })
        .collect()
}

fn communication_submit_body(submission: &Submission) -> CommSubmitRequest<'_> {
    let answers = &submission.answers;
    CommSubmitRequest {
        name: &submission.candidate.name,
        email: &submission.candidate.email,
        writing_answer: answers.get(WRITING_QUESTION_ID).unwrap_or(""),
        listening_answer: answers.get(LISTENING_QUESTION_ID).unwrap_or(""),
        mcq_answers: answers
            .iter()
            .filter(|(id, _)| *id != WRITING_QUESTION_ID && *id != LISTENING_QUESTION_ID)
            .collect(),
    }
}

#[async_trait]
impl AssessmentBackend for HttpBackend {
    fn kind(&self) -> AssessmentKind {
        self.kind
    }

    async fn send_code(&self, candidate: &Candidate) -> Result<(), ApiError> {
        let request = CodeRequest {
            name: &candidate.name,
            email: &candidate.email,
        };
        let _: Value = self.api.post(self.routes.send_code, &request).await?;
        info!("📧 {} code sent to {}", self.kind, candidate.email);
        Ok(())
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<Verification, ApiError> {
        let request = VerifyRequest { email, otp: code };
        let response: Option<VerifyResponse> = self.api.post(self.routes.verify_code, &request).await?;
        let response = response.unwrap_or_default();
        // Aptitude signals rejection with a 400; the others answer `verified`.
        Ok(match response.verified {
            Some(false) => Verification::rejected(response.reason.unwrap_or_else(|| "Invalid OTP".to_string())),
            _ => Verification::accepted(),
        })
    }

    async fn fetch_instructions(&self) -> Result<Instructions, ApiError> {
        match self.routes.instructions {
            Some(route) => self.api.get(route).await,
            None => Ok(Instructions {
                round_name: self.kind.round_name().to_string(),
                time_limit_seconds: None,
                total_questions: None,
                instructions: None,
            }),
        }
    }

    async fn start_exam(&self, candidate: &Candidate) -> Result<ExamPayload, ApiError> {
        let payload = match self.kind {
            AssessmentKind::Aptitude => self.start_aptitude(candidate).await?,
            AssessmentKind::Coding => self.start_coding().await?,
            AssessmentKind::Communication => self.start_communication(candidate).await?,
        };
        info!("📝 Loaded {} {} questions", payload.questions.len(), self.kind);
        Ok(payload)
    }

    async fn run_code(&self, candidate: &Candidate, question: &Question, code: &str) -> Result<RunOutput, ApiError> {
        let Some(route) = self.routes.run_code else {
            return Err(ApiError::Backend {
                status: 404,
                detail: format!("The {} round has no code runner", self.kind),
            });
        };
        let request = CodingSubmitRequest {
            name: &candidate.name,
            email: &candidate.email,
            question_title: &question.prompt,
            language: question_language(question, &self.coding_language),
            code,
        };
        let response: RunCodeResponse = self.api.post(route, &request).await?;
        Ok(RunOutput {
            success: response.success,
            output: response.output,
        })
    }

    async fn submit_answers(&self, submission: &Submission) -> Result<AssessmentResult, ApiError> {
        info!(
            "📤 Submitting {} answers for {} ({:?})",
            submission.answers.len(),
            submission.candidate.email,
            submission.trigger
        );
        match self.kind {
            AssessmentKind::Aptitude => self.submit_aptitude(submission).await,
            AssessmentKind::Coding => self.submit_coding(submission).await,
            AssessmentKind::Communication => self.submit_communication(submission).await,
        }
    }
}

fn aptitude_questions(raw: Vec<AptitudeQuestion>) -> QuestionSet {
    QuestionSet::new(
        raw.into_iter()
            .map(|q| {
                let options = q
                    .options
                    .into_iter()
                    .map(|(key, label)| ChoiceOption::new(key, label))
                    .collect();
                Question::multiple_choice(q.no.to_string(), q.question, options)
            })
            .collect(),
    )
}

fn coding_questions(raw: Vec<CodingQuestion>, language: &str) -> QuestionSet {
    QuestionSet::new(
        raw.into_iter()
            .enumerate()
            .map(|(i, q)| {
                let question = Question::code((i + 1).to_string(), q.title, language);
                match q.description {
                    Some(description) => question.with_context(description),
                    None => question,
                }
            })
            .collect(),
    )
}

// MCQs are keyed by their position because the backend scores
// `mcq_answers[str(i)]`.
fn communication_questions(exam: CommExam) -> QuestionSet {
    let mut questions = Vec::new();

    if let Some(prompt) = exam.writing_prompt {
        questions.push(Question::free_text(WRITING_QUESTION_ID, prompt));
    }
    if let Some(paragraph) = exam.listening_paragraph {
        questions.push(
            Question::free_text(LISTENING_QUESTION_ID, "Summarize what you heard in your own words.")
                .with_context(paragraph),
        );
    }
    for (i, mcq) in exam.reading_mcqs.into_iter().enumerate() {
        let options = mcq.options.into_iter().map(|o| ChoiceOption::new(o.clone(), o)).collect();
        let mut question = Question::multiple_choice(i.to_string(), mcq.question, options);
        if let Some(paragraph) = &exam.reading_paragraph {
            question = question.with_context(paragraph.clone());
        }
        questions.push(question);
    }

    QuestionSet::new(questions)
}
