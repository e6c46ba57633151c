//! Inbound and outbound event vocabularies.
//!
//! Both enums are internally tagged by `"type"` with snake_case names, so a
//! browser sends `{"type":"cast_vote","crush_id":2}` and receives
//! `{"type":"voting_progress","voted":2,"total":3}`.

use serde::{Deserialize, Serialize};

use crate::types::{CrushId, Difficulty, Phase, RoomId, UserId};
use crate::views::{ClientQuestion, CrushCard, RoomSummary, RoomView, Standing, UserView};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Must be the first frame on a connection.
    Handshake { version: u32, token: String },
    /// Keep-alive; answered with `HeartbeatAck`.
    Heartbeat { client_time: u64 },
    /// Polite goodbye before closing the socket.
    Disconnect { reason: String },

    RefreshLobbyList,
    /// Open a new lobby with the sender as host.
    CreateRoom,
    JoinRoom { room_id: RoomId },
    LeaveRoom,

    /// Host only, Lobby only.
    StartVoting,
    CastVote { crush_id: CrushId },
    /// Lobby only.
    SetReady { ready: bool },
    /// Answer to the sender's current question, as the answer text.
    SubmitAnswer { answer: String },
    /// Host only.
    KickUser { user_id: UserId },
    /// Victory only.
    ReturnToLobby,
}

impl ClientEvent {
    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Handshake { .. } => "handshake",
            ClientEvent::Heartbeat { .. } => "heartbeat",
            ClientEvent::Disconnect { .. } => "disconnect",
            ClientEvent::RefreshLobbyList => "refresh_lobby_list",
            ClientEvent::CreateRoom => "create_room",
            ClientEvent::JoinRoom { .. } => "join_room",
            ClientEvent::LeaveRoom => "leave_room",
            ClientEvent::StartVoting => "start_voting",
            ClientEvent::CastVote { .. } => "cast_vote",
            ClientEvent::SetReady { .. } => "set_ready",
            ClientEvent::SubmitAnswer { .. } => "submit_answer",
            ClientEvent::KickUser { .. } => "kick_user",
            ClientEvent::ReturnToLobby => "return_to_lobby",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // -- Connection --
    HandshakeAck {
        user_id: UserId,
        username: String,
        /// Milliseconds since the server started.
        server_time: u64,
    },
    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },
    /// HTTP-style `code`: 400 bad request, 401 unauthenticated, 403
    /// forbidden or banned, 404 not found, 409 conflicting state, 503
    /// upstream unavailable.
    Error {
        code: u16,
        message: String,
    },
    /// The host removed you; the socket closes right after.
    Kicked {
        reason: String,
    },

    // -- Lobby browser and membership --
    LobbyList {
        rooms: Vec<RoomSummary>,
    },
    RoomSnapshot {
        room: RoomView,
        your_user_id: UserId,
    },
    UserJoined {
        user: UserView,
    },
    RosterChanged {
        users: Vec<UserView>,
        host_user_id: UserId,
    },
    /// Sent to the player who just became host.
    HostPromoted {
        previous_host_name: String,
        phase: Phase,
    },
    HostChanged {
        host_user_id: UserId,
        host_display_name: String,
    },
    /// Host only: everyone the host may kick.
    KickRoster {
        users: Vec<UserView>,
    },

    // -- Ready check --
    UserReady {
        user_id: UserId,
        ready: bool,
    },
    /// Host only.
    ReadyCheck {
        all_ready: bool,
    },

    // -- Voting --
    VotingStarted {
        crushes: Vec<CrushCard>,
        standings: Vec<Standing>,
    },
    VotingProgress {
        voted: usize,
        total: usize,
    },
    VotingResult {
        crush: CrushCard,
        final_voter: UserId,
    },

    // -- Trivia --
    RoundStart {
        round: u8,
        category: String,
        difficulty: Difficulty,
        question_count: usize,
        seconds: u32,
    },
    RoundQuestion {
        question: ClientQuestion,
    },
    /// Sent only to the answering player.
    AnswerResult {
        correct: bool,
        points_awarded: u32,
        score: u32,
        /// True once the player has answered every question of the round.
        finished: bool,
    },
    Countdown {
        phase: Phase,
        remaining: u32,
    },
    RoundEnd {
        round: u8,
    },
    LeaderboardUpdate {
        standings: Vec<Standing>,
    },

    // -- Intermission and finale --
    LoungeStart {
        standings: Vec<Standing>,
        dialogue: Vec<String>,
        next_category: String,
        next_difficulty: Difficulty,
        seconds: u32,
    },
    VictorySummary {
        standings: Vec<Standing>,
        champion: Option<Standing>,
        lines: Vec<String>,
    },
    /// The game could not continue; the room is back in the lobby.
    GameAborted {
        reason: String,
    },
}

impl ServerEvent {
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // ClientEvent wire shape
    // =====================================================================

    #[test]
    fn test_client_event_cast_vote_decodes_from_browser_json() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"cast_vote","crush_id":2}"#).unwrap();
        assert_eq!(ev, ClientEvent::CastVote { crush_id: CrushId(2) });
        assert_eq!(ev.kind(), "cast_vote");
    }

    #[test]
    fn test_client_event_unit_variant_decodes_from_type_only() {
        let ev: ClientEvent = serde_json::from_str(r#"{"type":"return_to_lobby"}"#).unwrap();
        assert_eq!(ev, ClientEvent::ReturnToLobby);
    }

    #[test]
    fn test_client_event_handshake_requires_token() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"handshake","version":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_event_unknown_type_fails() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"fly_to_moon","speed":9000}"#);
        assert!(result.is_err());
    }

    // =====================================================================
    // ServerEvent wire shape
    // =====================================================================

    #[test]
    fn test_server_event_error_json_format() {
        let json = serde_json::to_value(ServerEvent::error(409, "game in progress")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], 409);
        assert_eq!(json["message"], "game in progress");
    }

    #[test]
    fn test_server_event_countdown_carries_phase_name() {
        let ev = ServerEvent::Countdown {
            phase: Phase::Trivia,
            remaining: 12,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "countdown");
        assert_eq!(json["phase"], "trivia");
        assert_eq!(json["remaining"], 12);
    }

    #[test]
    fn test_server_event_victory_without_champion_is_null() {
        let ev = ServerEvent::VictorySummary {
            standings: vec![],
            champion: None,
            lines: vec!["nobody played".into()],
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert!(json["champion"].is_null());
        let back: ServerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
