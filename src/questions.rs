//! Question bank loading and validation.
//!
//! The bank is a YAML list of questions, each carrying its four choices and
//! the correct `(choice, text)` pair. A bank that fails the consistency check
//! between `correct` and `choices` is rejected wholesale at load time; a
//! partially-valid bank never exists.

use crate::answer::Choice;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub enum BankError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Inconsistent { question_id: String, detail: String },
    DuplicateId(String),
}

impl From<std::io::Error> for BankError {
    fn from(err: std::io::Error) -> Self {
        BankError::Io(err)
    }
}

impl From<serde_yaml::Error> for BankError {
    fn from(err: serde_yaml::Error) -> Self {
        BankError::Parse(err)
    }
}

impl fmt::Display for BankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankError::Io(e) => write!(f, "failed to read question bank: {}", e),
            BankError::Parse(e) => write!(f, "failed to parse question bank: {}", e),
            BankError::Inconsistent { question_id, detail } => {
                write!(f, "question {:?} is inconsistent: {}", question_id, detail)
            }
            BankError::DuplicateId(id) => {
                write!(f, "question id {:?} appears more than once", id)
            }
        }
    }
}

impl std::error::Error for BankError {}

/// The possible choices for a question and which one is correct.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerKey {
    pub choices: HashMap<Choice, String>,
    pub correct: (Choice, String),
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub id: String,
    pub content: String,
    pub answers: AnswerKey,
}

impl Question {
    pub fn correct_choice(&self) -> Choice {
        self.answers.correct.0
    }

    /// The `correct` pair must reference a listed choice and carry its exact
    /// text, otherwise the whole bank is rejected.
    fn validate(&self) -> Result<(), BankError> {
        let (correct_choice, correct_text) = &self.answers.correct;
        match self.answers.choices.get(correct_choice) {
            None => Err(BankError::Inconsistent {
                question_id: self.id.clone(),
                detail: format!(
                    "the `correct` field references choice {} which is not among the listed choices",
                    correct_choice
                ),
            }),
            Some(listed) if listed != correct_text => Err(BankError::Inconsistent {
                question_id: self.id.clone(),
                detail: format!(
                    "the `correct` text {:?} does not match choice {} ({:?})",
                    correct_text, correct_choice, listed
                ),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Validated, id-keyed set of quiz questions for the current event.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: HashMap<String, Question>,
}

impl QuestionBank {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, BankError> {
        let questions: Vec<Question> = serde_yaml::from_str(contents)?;
        Self::from_questions(questions)
    }

    pub fn from_questions(questions: Vec<Question>) -> Result<Self, BankError> {
        let mut by_id = HashMap::with_capacity(questions.len());
        for mut question in questions {
            question.id = question.id.trim().to_string();
            question.content = question.content.trim().to_string();
            question.validate()?;
            let id = question.id.clone();
            if by_id.insert(id.clone(), question).is_some() {
                return Err(BankError::DuplicateId(id));
            }
        }
        Ok(Self { questions: by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.get(id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_BANK: &str = r#"
- id: rust-ownership
  content: Who owns a value after a move?
  answers:
    choices:
      0: "The original binding"
      1: "The new binding"
      2: "Both bindings"
      3: "Neither binding"
    correct: [1, "The new binding"]
- id: rust-borrow
  content: How many mutable borrows may coexist?
  answers:
    choices:
      0: "Zero"
      1: "One"
      2: "Two"
      3: "Unlimited"
    correct: [1, "One"]
    comment: The borrow checker enforces this at compile time.
"#;

    #[test]
    fn test_load_valid_bank() {
        let bank = QuestionBank::from_yaml(SAMPLE_BANK).unwrap();
        assert_eq!(bank.len(), 2);
        let question = bank.get("rust-ownership").unwrap();
        assert_eq!(question.correct_choice(), Choice::new(1).unwrap());
        assert_eq!(
            question.answers.choices[&Choice::new(1).unwrap()],
            "The new binding"
        );
    }

    #[test]
    fn test_reject_mismatched_correct_text() {
        let bank = r#"
- id: broken
  content: Which one?
  answers:
    choices:
      0: "Yes"
      1: "No"
      2: "Maybe"
      3: "Later"
    correct: [0, "No"]
"#;
        let err = QuestionBank::from_yaml(bank).unwrap_err();
        assert!(matches!(err, BankError::Inconsistent { .. }));
    }

    #[test]
    fn test_reject_correct_outside_choices() {
        let bank = r#"
- id: broken
  content: Which one?
  answers:
    choices:
      0: "Yes"
      1: "No"
    correct: [3, "Later"]
"#;
        let err = QuestionBank::from_yaml(bank).unwrap_err();
        assert!(matches!(err, BankError::Inconsistent { .. }));
    }

    #[test]
    fn test_reject_choice_index_outside_domain() {
        let bank = r#"
- id: broken
  content: Which one?
  answers:
    choices:
      0: "Yes"
      7: "Out of range"
    correct: [0, "Yes"]
"#;
        assert!(matches!(
            QuestionBank::from_yaml(bank).unwrap_err(),
            BankError::Parse(_)
        ));
    }

    #[test]
    fn test_reject_duplicate_question_id() {
        let bank = r#"
- id: twice
  content: First?
  answers:
    choices: {0: "A", 1: "B", 2: "C", 3: "D"}
    correct: [0, "A"]
- id: twice
  content: Second?
  answers:
    choices: {0: "A", 1: "B", 2: "C", 3: "D"}
    correct: [1, "B"]
"#;
        assert!(matches!(
            QuestionBank::from_yaml(bank).unwrap_err(),
            BankError::DuplicateId(_)
        ));
    }
}
