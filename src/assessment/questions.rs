use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChoiceOption {
    pub key: String,
    pub label: String,
}

impl ChoiceOption {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseSlot {
    MultipleChoice { options: Vec<ChoiceOption> },
    FreeText,
    Code { language: String, template: Option<String> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Passage the prompt refers to (reading or listening text).
    pub context: Option<String>,
    pub slot: ResponseSlot,
}

impl Question {
    pub fn multiple_choice(id: impl Into<String>, prompt: impl Into<String>, options: Vec<ChoiceOption>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            context: None,
            slot: ResponseSlot::MultipleChoice { options },
        }
    }

    pub fn free_text(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            context: None,
            slot: ResponseSlot::FreeText,
        }
    }

    pub fn code(id: impl Into<String>, prompt: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            context: None,
            slot: ResponseSlot::Code {
                language: language.into(),
                template: None,
            },
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn accepts_option(&self, value: &str) -> bool {
        match &self.slot {
            ResponseSlot::MultipleChoice { options } => options.iter().any(|o| o.key == value),
            _ => true,
        }
    }
}

/// Ordered question list fetched once per session. There is no mutating API.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Builds the set, dropping later duplicates of an identifier.
    pub fn new(questions: Vec<Question>) -> Self {
        let mut seen = HashSet::new();
        let questions = questions
            .into_iter()
            .filter(|q| seen.insert(q.id.clone()))
            .collect();
        Self { questions }
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.questions.iter().map(|q| q.id.as_str())
    }
}

impl<'a> IntoIterator for &'a QuestionSet {
    type Item = &'a Question;
    type IntoIter = std::slice::Iter<'a, Question>;

    fn into_iter(self) -> Self::IntoIter {
        self.questions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abcd() -> Vec<ChoiceOption> {
        ["A", "B", "C", "D"]
            .iter()
            .map(|k| ChoiceOption::new(*k, format!("option {}", k)))
            .collect()
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let set = QuestionSet::new(vec![
            Question::free_text("1", "first"),
            Question::free_text("1", "second"),
            Question::free_text("2", "third"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("1").unwrap().prompt, "first");
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn test_accepts_option() {
        let mcq = Question::multiple_choice("3", "Pick one", abcd());
        assert!(mcq.accepts_option("B"));
        assert!(!mcq.accepts_option("E"));

        let essay = Question::free_text("writing", "Describe a project");
        assert!(essay.accepts_option("anything at all"));
    }
}
