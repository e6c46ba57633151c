//! Question sets and the question provider seam.
//!
//! Providers return records in the shape of the public trivia APIs
//! (`correctAnswer`, `incorrectAnswers`). A [`QuestionSet`] turns them into
//! client-safe [`ClientQuestion`]s with shuffled answers and keeps the
//! answer key on the server.

use crushparty_protocol::{ClientQuestion, Difficulty};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// A question record as the provider delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub category: String,
    pub question: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not be reached or answered garbage.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider returned no questions")]
    Empty,
}

/// Source of trivia questions.
///
/// Called from a background task, never from inside a room actor, so a
/// slow provider delays only the round it is loading.
pub trait QuestionProvider: Send + Sync + 'static {
    /// Up to `count` questions of `difficulty` in the category with
    /// provider id `category`.
    fn fetch_questions(
        &self,
        category: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Question>, ProviderError>> + Send;
}

// ---------------------------------------------------------------------------
// QuestionSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PreparedQuestion {
    client: ClientQuestion,
    correct_answer: String,
}

/// The questions of one trivia round, shared by every player in the room.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    category: String,
    difficulty: Difficulty,
    questions: Vec<PreparedQuestion>,
}

impl QuestionSet {
    /// Shuffles each question's answers and strips the answer key from
    /// what clients will see. At most `limit` questions are kept.
    ///
    /// # Errors
    /// [`ProviderError::Empty`] if there is nothing to play.
    pub fn prepare(
        category: &str,
        difficulty: Difficulty,
        questions: Vec<Question>,
        limit: usize,
    ) -> Result<Self, ProviderError> {
        let mut rng = rand::rng();
        let kept: Vec<Question> = questions.into_iter().take(limit).collect();
        let total = kept.len();
        let prepared: Vec<PreparedQuestion> = kept
            .into_iter()
            .enumerate()
            .map(|(index, q)| {
                let mut answers = q.incorrect_answers;
                answers.push(q.correct_answer.clone());
                answers.shuffle(&mut rng);
                PreparedQuestion {
                    client: ClientQuestion {
                        index,
                        total,
                        category: category.to_owned(),
                        difficulty,
                        question: q.question,
                        answers,
                    },
                    correct_answer: q.correct_answer,
                }
            })
            .collect();

        if prepared.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(Self {
            category: category.to_owned(),
            difficulty,
            questions: prepared,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn client_question(&self, index: usize) -> Option<&ClientQuestion> {
        self.questions.get(index).map(|q| &q.client)
    }

    /// Whether `answer` is correct for question `index`. Surrounding
    /// whitespace is ignored; out-of-range indexes are never correct.
    pub fn check(&self, index: usize, answer: &str) -> bool {
        self.questions
            .get(index)
            .is_some_and(|q| q.correct_answer.trim() == answer.trim())
    }
}

// ---------------------------------------------------------------------------
// StaticQuestionBank
// ---------------------------------------------------------------------------

/// In-memory provider backed by a fixed list of questions.
///
/// Lookup is best effort so a small bank still fills every round: matching
/// category and difficulty first, then category, then difficulty, then the
/// whole bank. Categories match on their slug, so `"Film & TV"` serves
/// requests for `"film_and_tv"`.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestionBank {
    questions: Vec<Question>,
}

impl StaticQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Parses a JSON array of provider records.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    fn select(&self, category: &str, difficulty: Difficulty, count: usize) -> Vec<Question> {
        let wanted = slug(category);
        let same_category = |q: &&Question| slug(&q.category) == wanted;
        let same_difficulty = |q: &&Question| q.difficulty == difficulty;

        let tiers: [Vec<&Question>; 3] = [
            self.questions
                .iter()
                .filter(|q| same_category(q) && same_difficulty(q))
                .collect(),
            self.questions.iter().filter(same_category).collect(),
            self.questions.iter().filter(same_difficulty).collect(),
        ];
        let picked = tiers
            .into_iter()
            .find(|tier| !tier.is_empty())
            .unwrap_or_else(|| self.questions.iter().collect());
        picked.into_iter().take(count).cloned().collect()
    }
}

impl QuestionProvider for StaticQuestionBank {
    async fn fetch_questions(
        &self,
        category: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Question>, ProviderError> {
        let questions = self.select(category, difficulty, count);
        if questions.is_empty() {
            return Err(ProviderError::Empty);
        }
        tracing::debug!(category, %difficulty, served = questions.len(), "served questions from static bank");
        Ok(questions)
    }
}

/// `"Film & TV"` → `"film_and_tv"`.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in name
        .replace('&', " and ")
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push('_');
        }
        out.push_str(&word.to_ascii_lowercase());
    }
    out
}
