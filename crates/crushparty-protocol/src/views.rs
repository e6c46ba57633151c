//! Client-facing views of room state.
//!
//! These are snapshots, never references into the live room: the room
//! actor builds them when it has something to announce.

use serde::{Deserialize, Serialize};

use crate::types::{CrushId, Difficulty, Phase, RoomId, UserId};

/// One seated player as the other players see them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub user_id: UserId,
    pub username: String,
    pub avatar_name: String,
    pub ready: bool,
    pub score: u32,
    /// False once the player dropped mid-game; they keep their seat and
    /// score until the room returns to the lobby.
    pub connected: bool,
}

/// Full room snapshot sent on join and on return to lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub room_id: RoomId,
    pub host_user_id: UserId,
    pub host_display_name: String,
    pub phase: Phase,
    pub game_active: bool,
    pub trivia_round_index: u8,
    pub users: Vec<UserView>,
}

/// Lobby browser row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub host_display_name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub phase: Phase,
    pub joinable: bool,
}

/// One leaderboard row. `rank` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: u32,
    pub user_id: UserId,
    pub username: String,
    pub avatar_name: String,
    pub score: u32,
}

/// A voting option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrushCard {
    pub id: CrushId,
    pub name: String,
    pub tagline: String,
}

/// A question as shown to players: answers shuffled, no answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuestion {
    pub index: usize,
    pub total: usize,
    pub category: String,
    pub difficulty: Difficulty,
    pub question: String,
    pub answers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_question_has_no_answer_key_field() {
        let q = ClientQuestion {
            index: 0,
            total: 20,
            category: "Music".into(),
            difficulty: Difficulty::Easy,
            question: "Who sang Thriller?".into(),
            answers: vec!["Prince".into(), "Michael Jackson".into()],
        };
        let json = serde_json::to_value(&q).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys.len(),
            6,
            "unexpected client question fields: {keys:?}"
        );
        assert!(json.get("correct_answer").is_none());
        assert_eq!(json["difficulty"], "easy");
    }

    #[test]
    fn test_room_view_serializes_phase_and_ids_flat() {
        let view = RoomView {
            room_id: RoomId(9),
            host_user_id: UserId(1),
            host_display_name: "ava".into(),
            phase: Phase::Lobby,
            game_active: false,
            trivia_round_index: 0,
            users: vec![UserView {
                user_id: UserId(1),
                username: "ava".into(),
                avatar_name: "fox".into(),
                ready: false,
                score: 0,
                connected: true,
            }],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["room_id"], 9);
        assert_eq!(json["phase"], "lobby");
        assert_eq!(json["users"][0]["avatar_name"], "fox");
    }
}
