use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

/// Identity used to request and verify a one-time code.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Validate)]
pub struct Candidate {
    #[validate(length(min = 1, message = "Please provide name and email"))]
    pub name: String,
    #[validate(
        length(min = 1, message = "Please provide name and email"),
        email(message = "Please provide a valid email address")
    )]
    pub email: String,
}

impl Candidate {
    /// Trims both fields and validates them.
    pub fn new(name: &str, email: &str) -> Result<Self, String> {
        let candidate = Self {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
        };
        candidate.validate().map_err(first_message)?;
        Ok(candidate)
    }

    /// Numeric id the aptitude backend expects before it assigns its own.
    ///
    /// Hash over the email's UTF-16 units: only the shift is truncated to
    /// 32 bits, the subtraction and addition keep full width.
    pub fn provisional_student_id(&self) -> i64 {
        let hash = self.email.encode_utf16().fold(0i64, |acc, unit| {
            let shifted = i64::from((acc as i32).wrapping_shl(5));
            shifted - acc + i64::from(unit)
        });
        hash.abs()
    }
}

fn first_message(errors: ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    // Report the name before the email, like the form reads.
    fields.sort_by_key(|(field, _)| if *field == "name" { 0 } else { 1 });
    fields
        .into_iter()
        .flat_map(|(_, errs)| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid candidate details".to_string())
}
