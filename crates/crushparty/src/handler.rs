//! Per-connection handler: handshake, auth, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `handshake` → validate version
//!   2. Authenticate token → get the user's identity
//!   3. Send `handshake_ack` and the lobby list → user is connected
//!   4. Loop: client frames in, room notifications out

use std::sync::Arc;
use std::time::Duration;

use crushparty_protocol::{
    ClientEvent, Codec, ConnectionId, Envelope, ProtocolError, RoomId, ServerEvent, UserId, PROTOCOL_VERSION,
};
use crushparty_room::{summarize_rooms, LeaveOutcome, Member, QuestionProvider, RoomError, RoomEvent, RoomOutbound};
use crushparty_session::{Authenticator, Identity};
use crushparty_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::server::ServerState;
use crate::PartyError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drop guard that forgets the user and takes them out of their room when
/// the handler exits, however it exits.
///
/// `Drop` is synchronous, so the async cleanup runs on a spawned task.
struct SessionGuard<A, P, C>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    user_id: UserId,
    connection_id: ConnectionId,
    state: Arc<ServerState<A, P, C>>,
}

impl<A, P, C> Drop for SessionGuard<A, P, C>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    fn drop(&mut self) {
        let user_id = self.user_id;
        let connection_id = self.connection_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.users.lock().await.unregister_connection(connection_id);
            match leave_current_room(&state, user_id).await {
                Ok(_) | Err(RoomError::NotInRoom(_)) => {}
                Err(e) => tracing::debug!(%user_id, error = %e, "leave on disconnect failed"),
            }
        });
    }
}

/// What the message loop should do after a client frame.
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, P, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, P, C>>,
) -> Result<(), PartyError>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let result = serve(&conn, &state).await;
    let _ = conn.close().await;
    result
}

async fn serve<A, P, C>(conn: &WebSocketConnection, state: &Arc<ServerState<A, P, C>>) -> Result<(), PartyError>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    let conn_id = conn.id();
    let mut seq: u64 = 1;

    // --- Step 1: Handshake ---
    let identity = perform_handshake(conn, state, &mut seq).await?;
    let user_id = identity.user_id;

    // Register and arm the guard together: a failed registration needs no
    // cleanup.
    let registered = state.users.lock().await.register_user(conn_id, identity.clone()).map(|_| ());
    if let Err(e) = registered {
        let err = PartyError::Session(e);
        send_error(conn, state, err.status_code(), &err.to_string(), &mut seq).await?;
        return Err(err);
    }
    let _guard = SessionGuard {
        user_id,
        connection_id: conn_id,
        state: Arc::clone(state),
    };
    tracing::info!(%conn_id, %user_id, username = %identity.username, "user connected");

    let ack = ServerEvent::HandshakeAck {
        user_id,
        username: identity.username.clone(),
        server_time: state.now_millis(),
    };
    send_event(conn, state, ack, &mut seq).await?;
    send_lobby_list(conn, state, &mut seq).await?;

    // --- Step 2: Message loop ---
    let (room_tx, mut room_rx) = mpsc::unbounded_channel::<RoomOutbound>();
    let member = Member::new(identity, conn_id, room_tx);
    let mut idle_deadline = Instant::now() + state.idle_timeout;

    loop {
        tokio::select! {
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%user_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%user_id, error = %e, "recv error");
                        break;
                    }
                };
                idle_deadline = Instant::now() + state.idle_timeout;

                let envelope: Envelope<ClientEvent> = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::debug!(%user_id, error = %e, "failed to decode envelope");
                        continue;
                    }
                };
                if let Flow::Close = handle_client_event(conn, state, &member, envelope.payload, &mut seq).await? {
                    break;
                }
            }
            Some(outbound) = room_rx.recv() => match outbound {
                RoomOutbound::Event(event) => send_event(conn, state, event, &mut seq).await?,
                RoomOutbound::Disconnect { reason } => {
                    tracing::info!(%user_id, %reason, "closing connection at the room's request");
                    state.rooms.lock().await.release_user(user_id);
                    send_event(conn, state, ServerEvent::Kicked { reason }, &mut seq).await?;
                    break;
                }
            },
            _ = tokio::time::sleep_until(idle_deadline) => {
                tracing::info!(%user_id, "connection idle, dropping");
                break;
            }
        }
    }

    // _guard drops here → unregister and leave fire.
    Ok(())
}

/// Receives the first frame, checks version and token, and returns the
/// authenticated identity.
async fn perform_handshake<A, P, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, P, C>>,
    seq: &mut u64,
) -> Result<Identity, PartyError>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::NoHandshake("connection closed").into());
        }
        Ok(Err(e)) => return Err(PartyError::Transport(e)),
        Err(_) => return Err(ProtocolError::NoHandshake("timed out").into()),
    };

    let envelope: Envelope<ClientEvent> = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            send_error(conn, state, 400, "expected handshake", seq).await?;
            return Err(e.into());
        }
    };

    let (version, token) = match envelope.payload {
        ClientEvent::Handshake { version, token } => (version, token),
        other => {
            let err = ProtocolError::HandshakeExpected(other.kind().to_owned());
            send_error(conn, state, 400, &err.to_string(), seq).await?;
            return Err(err.into());
        }
    };

    if version != PROTOCOL_VERSION {
        let err = ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: version,
        };
        send_error(conn, state, 400, &err.to_string(), seq).await?;
        return Err(err.into());
    }

    match state.auth.authenticate(&token).await {
        Ok(identity) => Ok(identity),
        Err(e) => {
            send_error(conn, state, 401, "unauthorized", seq).await?;
            Err(PartyError::Session(e))
        }
    }
}

/// Handles one decoded client event.
async fn handle_client_event<A, P, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, P, C>>,
    member: &Member,
    event: ClientEvent,
    seq: &mut u64,
) -> Result<Flow, PartyError>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    let user_id = member.user_id();
    let room_event = match event {
        ClientEvent::Handshake { .. } => {
            send_error(conn, state, 400, "already handshaken", seq).await?;
            return Ok(Flow::Continue);
        }
        ClientEvent::Heartbeat { client_time } => {
            let ack = ServerEvent::HeartbeatAck {
                client_time,
                server_time: state.now_millis(),
            };
            send_event(conn, state, ack, seq).await?;
            return Ok(Flow::Continue);
        }
        ClientEvent::Disconnect { reason } => {
            tracing::info!(%user_id, %reason, "client disconnected");
            return Ok(Flow::Close);
        }
        ClientEvent::RefreshLobbyList => {
            send_lobby_list(conn, state, seq).await?;
            return Ok(Flow::Continue);
        }
        ClientEvent::CreateRoom => {
            // Lock only for the registry call; sends happen after.
            let result = state.rooms.lock().await.create_room(member.clone());
            if let Err(e) = result {
                send_room_error(conn, state, e, seq).await?;
            }
            return Ok(Flow::Continue);
        }
        ClientEvent::JoinRoom { room_id } => {
            let result = join_room(state, room_id, member).await;
            if let Err(e) = result {
                tracing::debug!(%user_id, %room_id, error = %e, "join failed");
                send_room_error(conn, state, e, seq).await?;
            }
            return Ok(Flow::Continue);
        }
        ClientEvent::LeaveRoom => {
            let result = leave_current_room(state, user_id).await;
            match result {
                Ok(_) => send_lobby_list(conn, state, seq).await?,
                Err(e) => send_room_error(conn, state, e, seq).await?,
            }
            return Ok(Flow::Continue);
        }
        ClientEvent::StartVoting => RoomEvent::StartVoting,
        ClientEvent::CastVote { crush_id } => RoomEvent::CastVote { crush_id },
        ClientEvent::SetReady { ready } => RoomEvent::SetReady { ready },
        ClientEvent::SubmitAnswer { answer } => RoomEvent::SubmitAnswer { answer },
        ClientEvent::KickUser { user_id: target } => RoomEvent::KickUser { target },
        ClientEvent::ReturnToLobby => RoomEvent::ReturnToLobby,
    };

    let handle = state.rooms.lock().await.live_handle(user_id);
    let result = match handle {
        Ok(handle) => handle.send_event(user_id, room_event).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        send_room_error(conn, state, e, seq).await?;
    }
    Ok(Flow::Continue)
}

// The registry lock is never held across a room round trip: the handle is
// cloned under the lock, the room is awaited unlocked, and the result is
// recorded under the lock again.

async fn join_room<A, P, C>(
    state: &Arc<ServerState<A, P, C>>,
    room_id: RoomId,
    member: &Member,
) -> Result<(), RoomError>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    let user_id = member.user_id();
    let handle = state.rooms.lock().await.begin_join(room_id, user_id)?;
    handle.join(member.clone()).await?;
    state.rooms.lock().await.commit_join(room_id, user_id);
    Ok(())
}

async fn leave_current_room<A, P, C>(state: &Arc<ServerState<A, P, C>>, user_id: UserId) -> Result<LeaveOutcome, RoomError>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    let (room_id, handle) = state.rooms.lock().await.begin_leave(user_id)?;
    let result = match handle {
        Some(handle) => handle.leave(user_id).await,
        None => Err(RoomError::Unavailable(room_id)),
    };
    state.rooms.lock().await.finish_leave(user_id, room_id, result)
}

async fn send_lobby_list<A, P, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, P, C>>,
    seq: &mut u64,
) -> Result<(), PartyError>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    let handles = state.rooms.lock().await.room_handles();
    let rooms = summarize_rooms(&handles).await;
    send_event(conn, state, ServerEvent::LobbyList { rooms }, seq).await
}

async fn send_room_error<A, P, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, P, C>>,
    err: RoomError,
    seq: &mut u64,
) -> Result<(), PartyError>
where
    C: Codec,
{
    send_error(conn, state, err.status_code(), &err.to_string(), seq).await
}

async fn send_error<A, P, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, P, C>>,
    code: u16,
    message: &str,
    seq: &mut u64,
) -> Result<(), PartyError>
where
    C: Codec,
{
    send_event(conn, state, ServerEvent::error(code, message), seq).await
}

/// Wraps an event in an envelope and writes it to the socket.
async fn send_event<A, P, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, P, C>>,
    event: ServerEvent,
    seq: &mut u64,
) -> Result<(), PartyError>
where
    C: Codec,
{
    let envelope = Envelope::new(next_seq(seq), state.now_millis(), event);
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
