//! TCP server fronting the room engine
//!
//! Each connection introduces itself with `Hello`, then issues commands.
//! Mutations that change a room are broadcast to every connection routed to
//! that room; failures go back to the offending connection alone.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use retroboard_core::engine::{ActionItemPatch, Caller, EngineEvent, NewRoom, RoomEngine};
use retroboard_core::models::Room;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientCommand, RoomCheckInfo, ServerEvent};

/// Outbound queue depth per connection
const OUTBOUND_QUEUE: usize = 64;

/// Shared server state
struct Shared {
    engine: Arc<RoomEngine>,
    /// Outbound channel per connected client
    senders: RwLock<HashMap<Uuid, mpsc::Sender<ServerEvent>>>,
}

impl Shared {
    async fn send_to(&self, connection_id: Uuid, event: ServerEvent) {
        let senders = self.senders.read().await;
        if let Some(tx) = senders.get(&connection_id) {
            if tx.send(event).await.is_err() {
                debug!(connection_id = %connection_id, "Failed to queue event");
            }
        }
    }

    /// Deliver an event to every connection routed to a room
    async fn broadcast_to_room(&self, room_id: Uuid, event: ServerEvent) {
        let targets = self.engine.connections().connections_in_room(room_id).await;
        let senders = self.senders.read().await;
        for id in targets {
            if let Some(tx) = senders.get(&id) {
                if tx.send(event.clone()).await.is_err() {
                    debug!(connection_id = %id, "Failed to queue event");
                }
            }
        }
    }

    async fn broadcast_to_room_except(
        &self,
        room_id: Uuid,
        event: ServerEvent,
        except: Uuid,
    ) {
        let targets = self.engine.connections().connections_in_room(room_id).await;
        let senders = self.senders.read().await;
        for id in targets {
            if id == except {
                continue;
            }
            if let Some(tx) = senders.get(&id) {
                let _ = tx.send(event.clone()).await;
            }
        }
    }
}

/// Server handle
pub struct Server {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start serving. `events_rx` is the engine's background event
    /// stream; port 0 picks a free port.
    pub async fn start(
        port: u16,
        engine: Arc<RoomEngine>,
        events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            engine,
            senders: RwLock::new(HashMap::new()),
        });

        let shared_clone = shared.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(accept_loop(listener, shared_clone, shutdown_rx));

        let shared_clone = shared.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(forward_engine_events(shared_clone, events_rx, shutdown_rx));

        Ok(Server {
            addr: bound_addr,
            shared,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of currently connected clients
    pub async fn connection_count(&self) -> usize {
        self.shared.senders.read().await.len()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        let shared = shared.clone();
                        tokio::spawn(handle_connection(stream, addr, shared));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Forward background engine events (timer ticks) to room audiences
async fn forward_engine_events(
    shared: Arc<Shared>,
    mut events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Some(EngineEvent::RoomUpdated(room)) => {
                        let room_id = room.id;
                        shared
                            .broadcast_to_room(room_id, ServerEvent::RoomUpdated { room })
                            .await;
                    }
                    None => break,
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Engine event forwarder shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    let (mut reader, writer) = tokio::io::split(stream);

    // First frame must be Hello
    let caller = match handle_hello(&mut reader).await {
        Ok(caller) => caller,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Handshake failed");
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    let (msg_tx, msg_rx) = mpsc::channel(OUTBOUND_QUEUE);
    shared
        .senders
        .write()
        .await
        .insert(connection_id, msg_tx.clone());
    let writer_handle = tokio::spawn(writer_task(writer, msg_rx));

    let _ = msg_tx.send(ServerEvent::Welcome { connection_id }).await;
    info!(addr = %addr, connection_id = %connection_id, "Client connected");

    // Read loop
    loop {
        match read_frame::<_, ClientCommand>(&mut reader).await {
            Ok(cmd) => {
                dispatch(cmd, connection_id, caller, &shared, &msg_tx).await;
            }
            Err(Error::ConnectionClosed) => {
                debug!(connection_id = %connection_id, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Read error");
                break;
            }
        }
    }

    // Cleanup
    writer_handle.abort();
    shared.senders.write().await.remove(&connection_id);
    handle_disconnect(&shared, connection_id).await;

    info!(connection_id = %connection_id, "Client disconnected");
}

/// Read and validate the introduction frame
async fn handle_hello(reader: &mut ReadHalf<TcpStream>) -> Result<Caller> {
    match read_frame::<_, ClientCommand>(reader).await? {
        ClientCommand::Hello { user_id } => Ok(Caller { user_id }),
        _ => Err(Error::Rejected("Expected Hello".into())),
    }
}

/// Writer task, draining the outbound queue to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<ServerEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &event).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Presence bookkeeping when a connection drops
async fn handle_disconnect(shared: &Shared, connection_id: Uuid) {
    let Some(route) = shared.engine.connections().route(connection_id).await else {
        return;
    };
    shared.engine.connections().unregister(connection_id).await;
    match shared
        .engine
        .set_participant_online(route.room_id, route.participant_id, false)
        .await
    {
        Ok(_) => {
            shared
                .broadcast_to_room(
                    route.room_id,
                    ServerEvent::ParticipantStatus {
                        room_id: route.room_id,
                        participant_id: route.participant_id,
                        is_online: false,
                    },
                )
                .await;
        }
        Err(e) => {
            debug!(room_id = %route.room_id, error = %e, "Presence update on disconnect failed");
        }
    }
}

/// Resolve the participant a connection acts as inside a room
async fn actor_for(shared: &Shared, connection_id: Uuid, room_id: Uuid) -> Option<Uuid> {
    match shared.engine.connections().route(connection_id).await {
        Some(route) if route.room_id == room_id => Some(route.participant_id),
        _ => None,
    }
}

/// Run one command against the engine and fan out the result
async fn dispatch(
    cmd: ClientCommand,
    connection_id: Uuid,
    caller: Caller,
    shared: &Arc<Shared>,
    reply_tx: &mpsc::Sender<ServerEvent>,
) {
    let reply_err = |message: String| async move {
        let _ = reply_tx.send(ServerEvent::Error { message }).await;
    };

    match cmd {
        ClientCommand::Hello { .. } => {
            reply_err("Already introduced".into()).await;
        }
        ClientCommand::Ping => {
            let _ = reply_tx.send(ServerEvent::Pong).await;
        }

        ClientCommand::CreateRoom {
            name,
            template,
            facilitator_name,
            password,
            max_postits_per_user,
        } => {
            let req = NewRoom {
                name,
                template,
                facilitator_name,
                password,
                max_postits_per_user,
            };
            match shared.engine.create_room(caller, req).await {
                Ok(room) => {
                    shared
                        .engine
                        .connections()
                        .register(connection_id, room.id, room.facilitator_id)
                        .await;
                    let _ = reply_tx.send(ServerEvent::RoomCreated { room }).await;
                }
                Err(e) => reply_err(e.to_string()).await,
            }
        }
        ClientCommand::JoinRoom {
            room_id,
            name,
            password,
            as_observer,
        } => {
            match shared
                .engine
                .join_room(caller, room_id, name, password, as_observer)
                .await
            {
                Ok((room, participant)) => {
                    shared
                        .engine
                        .connections()
                        .register(connection_id, room_id, participant.id)
                        .await;
                    shared
                        .broadcast_to_room_except(
                            room_id,
                            ServerEvent::ParticipantJoined {
                                room: room.clone(),
                                participant: participant.clone(),
                            },
                            connection_id,
                        )
                        .await;
                    let _ = reply_tx
                        .send(ServerEvent::RoomJoined { room, participant })
                        .await;
                }
                Err(e) => reply_err(e.to_string()).await,
            }
        }
        ClientCommand::RejoinRoom {
            room_id,
            participant_id,
        } => match shared.engine.rejoin_room(room_id, participant_id).await {
            Ok((room, participant)) => {
                shared
                    .engine
                    .connections()
                    .register(connection_id, room_id, participant.id)
                    .await;
                shared
                    .broadcast_to_room_except(
                        room_id,
                        ServerEvent::RoomUpdated { room: room.clone() },
                        connection_id,
                    )
                    .await;
                let _ = reply_tx
                    .send(ServerEvent::RoomJoined { room, participant })
                    .await;
            }
            Err(e) => reply_err(e.to_string()).await,
        },
        ClientCommand::CheckRoom { room_id } => match shared.engine.check_room(room_id).await {
            Ok(check) => {
                let _ = reply_tx
                    .send(ServerEvent::RoomChecked {
                        info: RoomCheckInfo {
                            id: check.id,
                            name: check.name,
                            status: check.status,
                            requires_password: check.requires_password,
                        },
                    })
                    .await;
            }
            Err(e) => reply_err(e.to_string()).await,
        },
        ClientCommand::ListRooms => {
            let Some(user_id) = caller.user_id else {
                reply_err("Listing rooms requires a signed-in user".into()).await;
                return;
            };
            match shared.engine.rooms_for_user(user_id) {
                Ok(rooms) => {
                    let _ = reply_tx.send(ServerEvent::RoomList { rooms }).await;
                }
                Err(e) => reply_err(e.to_string()).await,
            }
        }
        ClientCommand::DeleteRoom { room_id } => {
            let Some(actor_id) = actor_for(shared, connection_id, room_id).await else {
                reply_err("Not joined to this room".into()).await;
                return;
            };
            match shared.engine.delete_room(room_id, actor_id).await {
                Ok(connected) => {
                    let senders = shared.senders.read().await;
                    for id in connected {
                        if let Some(tx) = senders.get(&id) {
                            let _ = tx.send(ServerEvent::RoomDeleted { room_id }).await;
                        }
                    }
                }
                Err(e) => reply_err(e.to_string()).await,
            }
        }

        ClientCommand::CanCreatePostit { room_id } => {
            let Some(actor_id) = actor_for(shared, connection_id, room_id).await else {
                reply_err("Not joined to this room".into()).await;
                return;
            };
            let reason = shared
                .engine
                .can_create_postit(room_id, actor_id)
                .await
                .err()
                .map(|e| e.to_string());
            let _ = reply_tx
                .send(ServerEvent::PostitAllowance {
                    room_id,
                    allowed: reason.is_none(),
                    reason,
                })
                .await;
        }
        ClientCommand::CreatePostit {
            room_id,
            content,
            column_id,
            color,
        } => {
            let Some(actor_id) = actor_for(shared, connection_id, room_id).await else {
                reply_err("Not joined to this room".into()).await;
                return;
            };
            match shared
                .engine
                .create_postit(room_id, actor_id, content, column_id, color)
                .await
            {
                Ok(postit) => {
                    shared
                        .broadcast_to_room(
                            room_id,
                            ServerEvent::PostitCreated { room_id, postit },
                        )
                        .await;
                }
                Err(e) => reply_err(e.to_string()).await,
            }
        }

        // Every remaining command mutates one room and broadcasts the result
        other => {
            let Some(room_id) = command_room_id(&other) else {
                reply_err("Unsupported command".into()).await;
                return;
            };
            let Some(actor_id) = actor_for(shared, connection_id, room_id).await else {
                reply_err("Not joined to this room".into()).await;
                return;
            };
            match run_room_command(shared, other, room_id, actor_id).await {
                Ok(room) => {
                    shared
                        .broadcast_to_room(room_id, ServerEvent::RoomUpdated { room })
                        .await;
                }
                Err(e) => reply_err(e.to_string()).await,
            }
        }
    }
}

/// The room a broadcast-style command targets
fn command_room_id(cmd: &ClientCommand) -> Option<Uuid> {
    use ClientCommand::*;
    match cmd {
        CloseRoom { room_id }
        | ReopenRoom { room_id }
        | SetRole { room_id, .. }
        | ChangePhase { room_id, .. }
        | UpdatePostit { room_id, .. }
        | MovePostit { room_id, .. }
        | AssignPostitToGroup { room_id, .. }
        | TogglePostitVote { room_id, .. }
        | FocusPostit { room_id, .. }
        | CreateGroup { room_id, .. }
        | RenameGroup { room_id, .. }
        | DeleteGroup { room_id, .. }
        | CastGroupVote { room_id, .. }
        | RetractGroupVote { room_id, .. }
        | ResetTieVotes { room_id }
        | FocusGroup { room_id, .. }
        | CompleteGroup { room_id, .. }
        | CreateAction { room_id, .. }
        | UpdateAction { room_id, .. }
        | DeleteAction { room_id, .. }
        | StartTimer { room_id, .. }
        | StopTimer { room_id } => Some(*room_id),
        _ => None,
    }
}

/// Execute a room-mutating command, returning the updated aggregate
async fn run_room_command(
    shared: &Arc<Shared>,
    cmd: ClientCommand,
    room_id: Uuid,
    actor_id: Uuid,
) -> retroboard_core::Result<Room> {
    use ClientCommand::*;
    let engine = &shared.engine;
    match cmd {
        CloseRoom { .. } => engine.close_room(room_id, actor_id).await,
        ReopenRoom { .. } => engine.reopen_room(room_id, actor_id).await,
        SetRole {
            participant_id,
            role,
            ..
        } => {
            engine
                .set_participant_role(room_id, actor_id, participant_id, role)
                .await
        }
        ChangePhase { phase, .. } => engine.change_phase(room_id, actor_id, phase).await,
        UpdatePostit {
            postit_id, content, ..
        } => engine.update_postit(room_id, actor_id, postit_id, content).await,
        MovePostit {
            postit_id,
            column_id,
            ..
        } => engine.move_postit(room_id, actor_id, postit_id, column_id).await,
        AssignPostitToGroup {
            postit_id,
            group_id,
            ..
        } => {
            engine
                .assign_postit_to_group(room_id, actor_id, postit_id, group_id)
                .await
        }
        TogglePostitVote { postit_id, .. } => {
            engine.toggle_postit_vote(room_id, actor_id, postit_id).await
        }
        FocusPostit { postit_id, .. } => {
            engine.focus_postit(room_id, actor_id, postit_id).await
        }
        CreateGroup { title, color, .. } => {
            engine.create_group(room_id, actor_id, title, color).await
        }
        RenameGroup {
            group_id, title, ..
        } => engine.rename_group(room_id, actor_id, group_id, title).await,
        DeleteGroup { group_id, .. } => {
            engine.delete_group(room_id, actor_id, group_id).await
        }
        CastGroupVote { group_id, .. } => {
            engine.cast_group_vote(room_id, actor_id, group_id).await
        }
        RetractGroupVote { group_id, .. } => {
            engine.retract_group_vote(room_id, actor_id, group_id).await
        }
        ResetTieVotes { .. } => engine.reset_tie_votes(room_id, actor_id).await,
        FocusGroup { group_id, .. } => {
            engine.focus_group(room_id, actor_id, group_id).await
        }
        CompleteGroup { group_id, .. } => {
            engine
                .complete_group_and_focus_next(room_id, actor_id, group_id)
                .await
        }
        CreateAction {
            content,
            owner_name,
            group_id,
            ..
        } => {
            engine
                .create_action_item(room_id, actor_id, content, owner_name, group_id)
                .await
        }
        UpdateAction {
            action_id,
            content,
            owner_name,
            group_id,
            status,
            ..
        } => {
            let patch = ActionItemPatch {
                content,
                owner_name,
                group_id,
                status,
            };
            engine
                .update_action_item(room_id, actor_id, action_id, patch)
                .await
        }
        DeleteAction { action_id, .. } => {
            engine.delete_action_item(room_id, actor_id, action_id).await
        }
        StartTimer { duration_secs, .. } => {
            engine
                .clone()
                .start_timer(room_id, actor_id, duration_secs)
                .await
        }
        StopTimer { .. } => engine.stop_timer(room_id, actor_id).await,
        // Filtered out by command_room_id before we get here
        _ => Err(retroboard_core::Error::Conflict(
            "unsupported command".into(),
        )),
    }
}
