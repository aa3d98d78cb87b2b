//! Questions and the bank collaborator boundary.
//!
//! The engine never authors questions — it consumes an ordered, finite
//! draw from a [`QuestionBank`]. The bank is the extension point for real
//! content storage; [`FixedBank`] is the in-memory implementation used by
//! demos and tests.

use std::time::Duration;

use berean_protocol::{QuestionId, QuestionView};
use serde::{Deserialize, Serialize};

use crate::BankError;

/// A single quiz question, immutable once drawn into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    /// Answer options, in presentation order.
    pub options: Vec<String>,
    /// Index into `options` of the correct answer. Never serialized to
    /// clients while the question is open — see [`Question::view`].
    pub correct: usize,
    /// Optional override of the room's per-question time limit.
    #[serde(default)]
    pub time_limit: Option<Duration>,
}

impl Question {
    /// The client-facing projection: everything except the answer.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            prompt: self.prompt.clone(),
            options: self.options.clone(),
        }
    }

    /// Whether `option` is the correct answer.
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct
    }
}

/// What a session asks the bank for: count plus the room's content
/// selection, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSelection {
    pub question_count: usize,
    pub theme_ids: Vec<u32>,
    pub language: String,
}

/// The external content collaborator.
///
/// Implementations validate the selection and return an ordered draw.
/// The engine treats the result as opaque, finite, and immutable. Async
/// because real banks sit on storage or a service; [`FixedBank`] resolves
/// immediately.
pub trait QuestionBank: Send + Sync + 'static {
    /// Draws an ordered sequence of questions for one session.
    fn draw(
        &self,
        selection: &QuizSelection,
    ) -> impl std::future::Future<Output = Result<Vec<Question>, BankError>> + Send;
}

// ---------------------------------------------------------------------------
// FixedBank
// ---------------------------------------------------------------------------

/// An in-memory bank serving a fixed question list.
///
/// Ignores theme and language selection — it serves the first
/// `question_count` questions it holds (all of them when fewer). Useful
/// for demos and deterministic tests; a production bank would filter by
/// the selection.
#[derive(Debug, Clone, Default)]
pub struct FixedBank {
    questions: Vec<Question>,
}

impl FixedBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionBank for FixedBank {
    async fn draw(
        &self,
        selection: &QuizSelection,
    ) -> Result<Vec<Question>, BankError> {
        if self.questions.is_empty() {
            return Err(BankError::Empty);
        }
        let count = selection.question_count.min(self.questions.len());
        Ok(self.questions[..count].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: u64, correct: usize) -> Question {
        Question {
            id: QuestionId(id),
            prompt: format!("question {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct,
            time_limit: None,
        }
    }

    fn selection(count: usize) -> QuizSelection {
        QuizSelection {
            question_count: count,
            theme_ids: vec![],
            language: "en".into(),
        }
    }

    #[test]
    fn test_view_omits_correct_index() {
        let question = q(1, 2);
        let view = question.view();
        assert_eq!(view.id, question.id);
        assert_eq!(view.options, question.options);
        // QuestionView has no field for the answer; double-check the
        // serialized form too.
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("correct"));
    }

    #[test]
    fn test_is_correct() {
        let question = q(1, 2);
        assert!(question.is_correct(2));
        assert!(!question.is_correct(0));
        assert!(!question.is_correct(99));
    }

    #[tokio::test]
    async fn test_fixed_bank_draw_truncates_to_count() {
        let bank = FixedBank::new(vec![q(1, 0), q(2, 1), q(3, 2)]);
        let drawn = bank.draw(&selection(2)).await.unwrap();
        assert_eq!(drawn.len(), 2);
        assert_eq!(drawn[0].id, QuestionId(1));
    }

    #[tokio::test]
    async fn test_fixed_bank_draw_caps_at_available() {
        let bank = FixedBank::new(vec![q(1, 0)]);
        let drawn = bank.draw(&selection(10)).await.unwrap();
        assert_eq!(drawn.len(), 1);
    }

    #[tokio::test]
    async fn test_fixed_bank_empty_is_error() {
        let bank = FixedBank::default();
        let result = bank.draw(&selection(5)).await;
        assert_eq!(result, Err(BankError::Empty));
    }
}
