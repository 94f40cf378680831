use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{endpoint, ApiClient, Result};

// Recruiter-side resources: assessment templates, assignments and
// aptitude result review.

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssessmentTemplate {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub skill: Option<String>,
    pub difficulty: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub question_count: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
}

/// Create/update payload. Unset fields are left out so updates stay partial.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AssessmentDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Assignment {
    pub id: i64,
    pub candidate_id: i64,
    pub assessment_id: i64,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssignmentDraft {
    pub candidate_id: i64,
    pub assessment_id: i64,
    pub due_date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AptitudeResultRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub score: Option<i64>,
    pub status: Option<String>,
    pub total_questions: Option<i64>,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub answers: Option<Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AptitudeStatistics {
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub average_score: f64,
    pub pass_rate: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CandidateRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub overall_ai_score: Option<f64>,
    #[serde(default)]
    pub assessment_score: Option<f64>,
    #[serde(default)]
    pub final_score: Option<f64>,
}

/// One communication round as stored by the backend, with its scores.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommunicationAttempt {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub writing_answer: Option<String>,
    #[serde(default)]
    pub listening_answer: Option<String>,
    #[serde(default)]
    pub mcq_answers: Option<Value>,
    #[serde(default)]
    pub writing_score: Option<f64>,
    #[serde(default)]
    pub listening_score: Option<f64>,
    #[serde(default)]
    pub mcq_score: Option<f64>,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub submitted_at: Option<NaiveDateTime>,
}

impl ApiClient {
    pub async fn list_assessments(&self) -> Result<Vec<AssessmentTemplate>> {
        self.get("/assessments").await
    }

    pub async fn get_assessment(&self, id: i64) -> Result<AssessmentTemplate> {
        self.get(&format!("/assessments/{}", id)).await
    }

    pub async fn create_assessment(&self, draft: &AssessmentDraft) -> Result<AssessmentTemplate> {
        let created: AssessmentTemplate = self.post("/assessments", draft).await?;
        info!("✅ Created assessment #{}: {}", created.id, created.name);
        Ok(created)
    }

    pub async fn update_assessment(&self, id: i64, draft: &AssessmentDraft) -> Result<AssessmentTemplate> {
        self.put(&format!("/assessments/{}", id), draft).await
    }

    pub async fn delete_assessment(&self, id: i64) -> Result<()> {
        let _: Value = self.delete(&format!("/assessments/{}", id)).await?;
        info!("🗑️ Deleted assessment #{}", id);
        Ok(())
    }

    pub async fn assign_assessment(&self, draft: &AssignmentDraft) -> Result<Assignment> {
        let assignment: Assignment = self.post("/assignments", draft).await?;
        info!(
            "📨 Assigned assessment #{} to candidate #{}",
            assignment.assessment_id, assignment.candidate_id
        );
        Ok(assignment)
    }

    pub async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        self.get("/assignments").await
    }

    /// Assignments joined with their completion status; shape is backend-defined.
    pub async fn list_assignments_with_status(&self) -> Result<Vec<Value>> {
        self.get("/assignments/with-status").await
    }

    pub async fn aptitude_results(&self) -> Result<Vec<AptitudeResultRecord>> {
        self.get("/api/assessment/aptitude/results/all").await
    }

    /// Returns `None` when the backend has no result for the email.
    pub async fn aptitude_result_by_email(&self, email: &str) -> Result<Option<AptitudeResultRecord>> {
        let path = endpoint(&["api", "assessment", "aptitude", "results", "by-email", email])?;
        let value: Value = self.get(&path).await?;
        parse_optional_record(value)
    }

    pub async fn aptitude_result_by_id(&self, candidate_id: i64) -> Result<Option<AptitudeResultRecord>> {
        let value: Value = self
            .get(&format!("/api/assessment/aptitude/results/by-id/{}", candidate_id))
            .await?;
        parse_optional_record(value)
    }

    pub async fn aptitude_statistics(&self) -> Result<AptitudeStatistics> {
        self.get("/api/assessment/aptitude/results/statistics").await
    }

    pub async fn communication_attempts(&self) -> Result<Vec<CommunicationAttempt>> {
        self.get("/comm/all-exams").await
    }

    pub async fn list_candidates(&self) -> Result<Vec<CandidateRecord>> {
        self.get("/api/candidates/list").await
    }

    pub async fn get_candidate(&self, id: i64) -> Result<CandidateRecord> {
        self.get(&format!("/api/candidates/{}", id)).await
    }
}

// The by-email endpoint answers 200 with `{"message": ...}` when nothing matches.
fn parse_optional_record(value: Value) -> Result<Option<AptitudeResultRecord>> {
    if value.is_null() || value.get("id").is_none() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| super::ApiError::Decode(e.to_string()))
}
