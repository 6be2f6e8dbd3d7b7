//! Question records and the repository that hands them out
//!
//! The engine only needs one question per round. Where the questions come
//! from is behind [`QuestionRepository`]; [`QuestionBank`] is an in-memory
//! implementation loaded from a JSON file of question records.

use std::{fmt::Display, path::Path};

use async_trait::async_trait;
use garde::Validate;
use itertools::Itertools;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::constants;

/// How hard a question is rated by its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Easy question
    Easy,
    /// Medium question
    Medium,
    /// Hard question
    Hard,
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        })
    }
}

/// Everything needed to open one round
///
/// `choices` may or may not contain `correct_answer`; the round adds it when
/// missing so a spec can be built from a list of distractors alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSpec {
    /// The question text
    pub question: String,
    /// The text of the correct answer
    pub correct_answer: String,
    /// Answer choices, in source order
    pub choices: Vec<String>,
    /// Category label
    pub category: String,
    /// Difficulty rating, if the source has one
    pub difficulty: Option<Difficulty>,
}

/// A stored question as kept by the question bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// Row identifier, if the record came from a store that assigns one
    #[garde(skip)]
    #[serde(default)]
    pub id: Option<i64>,
    /// The question text
    #[garde(length(min = 1, max = constants::question::MAX_TEXT_LENGTH))]
    pub question: String,
    /// The correct answer
    #[garde(length(min = 1, max = constants::question::MAX_CHOICE_LENGTH))]
    pub answer: String,
    /// Incorrect answers offered alongside the correct one
    #[garde(
        length(min = constants::question::MIN_DISTRACTOR_COUNT, max = constants::question::MAX_DISTRACTOR_COUNT),
        inner(length(min = 1, max = constants::question::MAX_CHOICE_LENGTH))
    )]
    pub choices: Vec<String>,
    /// Category label
    #[garde(length(max = constants::question::MAX_CATEGORY_LENGTH))]
    pub category: String,
    /// How many times the question has been asked
    #[garde(skip)]
    #[serde(default)]
    pub used: u64,
    /// Where the question came from
    #[garde(skip)]
    #[serde(default)]
    pub source: String,
    /// Question format reported by the source (e.g. "multiple", "boolean")
    #[garde(skip)]
    #[serde(default)]
    pub kind: Option<String>,
    /// Difficulty rating
    #[garde(skip)]
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl Question {
    /// Converts the stored record into the spec a round is opened from
    pub fn to_round_spec(&self) -> RoundSpec {
        RoundSpec {
            question: self.question.clone(),
            correct_answer: self.answer.clone(),
            choices: self.choices.clone(),
            category: self.category.clone(),
            difficulty: self.difficulty,
        }
    }
}

/// Restricts which questions the repository may return
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Filters {
    /// Only questions whose category matches, ignoring case
    #[garde(length(min = 1, max = constants::question::MAX_CATEGORY_LENGTH))]
    #[serde(default)]
    pub category: Option<String>,
    /// Only questions of this difficulty
    #[garde(skip)]
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl Filters {
    /// Whether a question passes these filters
    pub fn matches(&self, question: &Question) -> bool {
        self.category
            .as_ref()
            .is_none_or(|category| category.eq_ignore_ascii_case(&question.category))
            && self
                .difficulty
                .is_none_or(|difficulty| question.difficulty == Some(difficulty))
    }
}

/// Errors raised by question repositories
#[derive(Error, Debug)]
pub enum Error {
    /// Nothing left that matches the filters
    #[error("no questions available")]
    NoQuestionsAvailable,
    /// A record in the bank failed validation
    #[error("question {index} is invalid: {report}")]
    Invalid {
        /// Position of the record in the bank file
        index: usize,
        /// What was wrong with it
        report: garde::Report,
    },
    /// The bank file could not be read
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),
    /// The bank file is not a JSON array of questions
    #[error("failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of questions for new rounds
///
/// Implementations mark the returned question as used so it is not handed
/// out again right away. What happens once the source runs dry is up to the
/// implementation; returning [`Error::NoQuestionsAvailable`] ends the quiz.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Picks the next question matching `filters` and marks it used
    async fn next_question(&self, filters: &Filters) -> Result<Question, Error>;
}

/// Draws `count` round specs from a repository, in draw order
///
/// # Errors
///
/// Fails with the first repository error, typically
/// [`Error::NoQuestionsAvailable`].
pub async fn draw_rounds(
    repository: &dyn QuestionRepository,
    filters: &Filters,
    count: usize,
) -> Result<Vec<RoundSpec>, Error> {
    let mut specs = Vec::with_capacity(count);
    for _ in 0..count {
        specs.push(repository.next_question(filters).await?.to_round_spec());
    }
    Ok(specs)
}

/// In-memory question repository
///
/// Only questions that have never been used are eligible. Selection among
/// eligible questions is uniform.
#[derive(Debug, Default)]
pub struct QuestionBank {
    questions: Mutex<Vec<Question>>,
}

impl QuestionBank {
    /// Creates a bank from already validated records
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: Mutex::new(questions),
        }
    }

    /// Loads and validates a JSON array of question records
    ///
    /// # Errors
    ///
    /// * `Error::Io` - the file cannot be read
    /// * `Error::Parse` - the file is not a JSON array of questions
    /// * `Error::Invalid` - a record breaks the content limits
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let questions: Vec<Question> = serde_json::from_str(&std::fs::read_to_string(path)?)?;

        if let Some((index, report)) = questions
            .iter()
            .enumerate()
            .find_map(|(index, q)| q.validate().err().map(|report| (index, report)))
        {
            return Err(Error::Invalid { index, report });
        }

        info!(path = %path.display(), count = questions.len(), "loaded question bank");
        Ok(Self::new(questions))
    }

    /// Number of questions that can still be handed out under `filters`
    pub fn remaining(&self, filters: &Filters) -> usize {
        self.questions
            .lock()
            .iter()
            .filter(|q| q.used == 0 && filters.matches(q))
            .count()
    }

    /// A copy of every record, including use counts
    pub fn snapshot(&self) -> Vec<Question> {
        self.questions.lock().clone()
    }
}

#[async_trait]
impl QuestionRepository for QuestionBank {
    async fn next_question(&self, filters: &Filters) -> Result<Question, Error> {
        let mut questions = self.questions.lock();

        let eligible = questions
            .iter()
            .positions(|q| q.used == 0 && filters.matches(q))
            .collect_vec();

        if eligible.is_empty() {
            return Err(Error::NoQuestionsAvailable);
        }

        let index = eligible[fastrand::usize(..eligible.len())];
        let question = &mut questions[index];
        question.used += 1;

        debug!(index, category = %question.category, "selected question");
        Ok(question.clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn question(text: &str, category: &str, difficulty: Difficulty) -> Question {
        Question {
            id: None,
            question: text.to_string(),
            answer: "Paris".to_string(),
            choices: vec!["Lyon".to_string(), "Nice".to_string(), "Nantes".to_string()],
            category: category.to_string(),
            used: 0,
            source: "test".to_string(),
            kind: Some("multiple".to_string()),
            difficulty: Some(difficulty),
        }
    }

    #[test]
    fn test_question_validation() {
        let q = question("Capital of France?", "Geography", Difficulty::Easy);
        assert!(q.validate().is_ok());

        let mut empty = q.clone();
        empty.question = String::new();
        assert!(empty.validate().is_err());

        let mut no_choices = q.clone();
        no_choices.choices.clear();
        assert!(no_choices.validate().is_err());

        let mut too_many = q;
        too_many.choices = vec!["x".to_string(); constants::round::MAX_CHOICE_COUNT];
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_filters_match_case_insensitive_category() {
        let q = question("Q", "Geography", Difficulty::Hard);
        let filters = Filters {
            category: Some("geography".to_string()),
            difficulty: None,
        };
        assert!(filters.matches(&q));

        let filters = Filters {
            category: None,
            difficulty: Some(Difficulty::Easy),
        };
        assert!(!filters.matches(&q));
        assert!(Filters::default().matches(&q));
    }

    #[test]
    fn test_round_spec_from_question() {
        let spec = question("Capital of France?", "Geography", Difficulty::Easy).to_round_spec();
        assert_eq!(spec.correct_answer, "Paris");
        assert_eq!(spec.choices.len(), 3);
        assert_eq!(spec.difficulty, Some(Difficulty::Easy));
    }

    #[tokio::test]
    async fn test_bank_marks_used_and_exhausts() {
        let bank = QuestionBank::new(vec![
            question("Q1", "Geography", Difficulty::Easy),
            question("Q2", "History", Difficulty::Easy),
        ]);
        let filters = Filters::default();

        let first = bank.next_question(&filters).await.unwrap();
        let second = bank.next_question(&filters).await.unwrap();
        assert_ne!(first.question, second.question);
        assert_eq!(first.used, 1);
        assert_eq!(bank.remaining(&filters), 0);

        assert!(matches!(
            bank.next_question(&filters).await,
            Err(Error::NoQuestionsAvailable)
        ));
        assert!(bank.snapshot().iter().all(|q| q.used == 1));
    }

    #[tokio::test]
    async fn test_bank_respects_filters() {
        let bank = QuestionBank::new(vec![
            question("Q1", "Geography", Difficulty::Easy),
            question("Q2", "History", Difficulty::Hard),
        ]);
        let filters = Filters {
            category: Some("History".to_string()),
            difficulty: None,
        };

        let picked = bank.next_question(&filters).await.unwrap();
        assert_eq!(picked.question, "Q2");
        assert!(matches!(
            bank.next_question(&filters).await,
            Err(Error::NoQuestionsAvailable)
        ));
        assert_eq!(bank.remaining(&Filters::default()), 1);
    }

    #[tokio::test]
    async fn test_draw_rounds_propagates_exhaustion() {
        let bank = QuestionBank::new(vec![question("Q1", "Geography", Difficulty::Easy)]);
        let result = draw_rounds(&bank, &Filters::default(), 2).await;
        assert!(matches!(result, Err(Error::NoQuestionsAvailable)));
    }

    #[test]
    fn test_load_rejects_invalid_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bank.json");
        let bad = question("", "Geography", Difficulty::Easy);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string(&vec![bad]).unwrap().as_bytes())
            .unwrap();

        assert!(matches!(
            QuestionBank::load(&path),
            Err(Error::Invalid { index: 0, .. })
        ));
    }

    #[test]
    fn test_load_reads_minimal_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bank.json");
        std::fs::write(
            &path,
            r#"[{"question": "2 + 2?", "answer": "4", "choices": ["3", "5"], "category": "Math", "difficulty": "easy"}]"#,
        )
        .unwrap();

        let bank = QuestionBank::load(&path).unwrap();
        assert_eq!(bank.remaining(&Filters::default()), 1);
        assert_eq!(bank.snapshot()[0].difficulty, Some(Difficulty::Easy));
    }
}
