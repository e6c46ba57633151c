//! Game settings and the crush roster.

use std::time::Duration;

use crushparty_protocol::{CrushCard, CrushId, Difficulty};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Crushes
// ---------------------------------------------------------------------------

/// A trivia category as the question provider knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Provider-side id, e.g. `"film_and_tv"`.
    pub id: String,
    /// Display name, e.g. `"Film & TV"`.
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A votable crush. The winner of the vote decides which categories the
/// three trivia rounds draw from, one per difficulty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crush {
    pub id: CrushId,
    pub name: String,
    pub tagline: String,
    pub easy: Category,
    pub medium: Category,
    pub hard: Category,
}

impl Crush {
    /// Category and difficulty for trivia round `round`, or `None` past
    /// the last round.
    pub fn category_for(&self, round: u8) -> Option<(&Category, Difficulty)> {
        let difficulty = Difficulty::for_round(round)?;
        let category = match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
        };
        Some((category, difficulty))
    }

    pub fn card(&self) -> CrushCard {
        CrushCard {
            id: self.id,
            name: self.name.clone(),
            tagline: self.tagline.clone(),
        }
    }
}

fn crush(id: u32, name: &str, tagline: &str, tiers: [(&str, &str); 3]) -> Crush {
    let [easy, medium, hard] = tiers.map(|(category_id, category_name)| Category::new(category_id, category_name));
    Crush {
        id: CrushId(id),
        name: name.to_owned(),
        tagline: tagline.to_owned(),
        easy,
        medium,
        hard,
    }
}

/// The stock roster.
pub fn default_crushes() -> Vec<Crush> {
    vec![
        crush(
            1,
            "Skylar",
            "Plays bass in three bands. None of them have a name yet.",
            [
                ("music", "Music"),
                ("film_and_tv", "Film & TV"),
                ("arts_and_literature", "Arts & Literature"),
            ],
        ),
        crush(
            2,
            "Dr. Reyes",
            "Will explain black holes on the first date.",
            [
                ("science", "Science"),
                ("geography", "Geography"),
                ("history", "History"),
            ],
        ),
        crush(
            3,
            "Jordan",
            "Knows every stadium by its old name.",
            [
                ("sport_and_leisure", "Sport & Leisure"),
                ("food_and_drink", "Food & Drink"),
                ("general_knowledge", "General Knowledge"),
            ],
        ),
        crush(
            4,
            "Marlowe",
            "Quotes poetry at brunch, unironically.",
            [
                ("arts_and_literature", "Arts & Literature"),
                ("society_and_culture", "Society & Culture"),
                ("history", "History"),
            ],
        ),
    ]
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Points for one correct answer, by difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTable {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl PointsTable {
    pub fn for_difficulty(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

impl Default for PointsTable {
    fn default() -> Self {
        Self {
            easy: 100,
            medium: 200,
            hard: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room a registry spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Seats per room, host included.
    pub max_players: usize,
    /// Questions requested per trivia round.
    pub question_count: usize,
    /// Length of a trivia round in seconds.
    pub round_seconds: u32,
    /// Length of a lounge intermission in seconds.
    pub lounge_seconds: u32,
    /// Time between countdown ticks.
    pub countdown_interval: Duration,
    /// Deadline for one question fetch; past it the game aborts to the lobby.
    pub provider_timeout: Duration,
    pub points: PointsTable,
    /// Voting candidates, in tie-break order.
    pub crushes: Vec<Crush>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            question_count: 20,
            round_seconds: 60,
            lounge_seconds: 20,
            countdown_interval: Duration::from_secs(1),
            provider_timeout: Duration::from_secs(10),
            points: PointsTable::default(),
            crushes: default_crushes(),
        }
    }
}

impl GameConfig {
    pub const MAX_QUESTIONS: usize = 50;

    /// Clamp out-of-range values so the config is safe to run with.
    ///
    /// - `max_players` at least 1.
    /// - `question_count` within `1..=MAX_QUESTIONS`.
    /// - `round_seconds` and `lounge_seconds` at least 1.
    /// - `provider_timeout` at least one second.
    /// - an empty roster is replaced by [`default_crushes`].
    pub fn validated(mut self) -> Self {
        if self.max_players == 0 {
            warn!("max_players is 0, using 1");
            self.max_players = 1;
        }
        let clamped = self.question_count.clamp(1, Self::MAX_QUESTIONS);
        if clamped != self.question_count {
            warn!(
                requested = self.question_count,
                used = clamped,
                "question_count out of range, clamping"
            );
            self.question_count = clamped;
        }
        if self.round_seconds == 0 {
            warn!("round_seconds is 0, using 1");
            self.round_seconds = 1;
        }
        if self.lounge_seconds == 0 {
            warn!("lounge_seconds is 0, using 1");
            self.lounge_seconds = 1;
        }
        if self.provider_timeout.is_zero() {
            warn!("provider_timeout is 0, using 1s");
            self.provider_timeout = Duration::from_secs(1);
        }
        if self.crushes.is_empty() {
            warn!("crush roster is empty, using the default roster");
            self.crushes = default_crushes();
        }
        self
    }

    pub fn crush(&self, id: CrushId) -> Option<&Crush> {
        self.crushes.iter().find(|c| c.id == id)
    }

    pub fn candidate_ids(&self) -> Vec<CrushId> {
        self.crushes.iter().map(|c| c.id).collect()
    }

    pub fn crush_cards(&self) -> Vec<CrushCard> {
        self.crushes.iter().map(Crush::card).collect()
    }
}
