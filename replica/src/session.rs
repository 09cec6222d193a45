//! Session actor — one peer's live membership in a board room.
//!
//! DESIGN
//! ======
//! A single task owns the scene, the engine, presence, undo history and
//! auto-save. Everything else talks to it through a [`SessionHandle`]:
//! commands over `mpsc`, events over `broadcast`, connection status over
//! `watch`. Nothing outside the task touches replicated state.
//!
//! The actor loop selects over the relay link, commands, and timers
//! (presence heartbeat, liveness poll, pending-edit expiry, auto-save).
//! Local editing never waits on the network: while the link is down, edits
//! land in the store and go out with the next bootstrap push.
//!
//! LIFECYCLE
//! =========
//! Idle -> Dialing -> Up -> (Idle after backoff on any failure). Every new
//! connection re-runs the bootstrap handshake; status reads `Connected`
//! only once the relay's Step1 has been handled. On disconnect every
//! remote peer's presence is cleared. Shutdown sends an explicit presence
//! leave, closes the socket and flushes a pending save.

use std::sync::Arc;

use frames::{Cursor, ObjectId, PeerId, PeerPresence, Shape, Tag, split_frame};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::board::room_name;
use crate::config::ReplicaConfig;
use crate::engine::{LocalEdit, SceneChange, SyncEngine, SyncError};
use crate::history::History;
use crate::persistence::{AutoSave, PersistenceBackend, SceneDocument};
use crate::presence::PresenceChannel;
use crate::scene::SceneGraph;
use crate::transport::{Backoff, Connection, TransportError};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

// =============================================================================
// PUBLIC TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    /// Other peers, sorted by peer id.
    Peers(Vec<PeerPresence>),
    /// Remote state reached the scene.
    Remote(Vec<SceneChange>),
    Saved { objects: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session task has stopped")]
    Closed,
    #[error("object {0} does not exist")]
    UnknownObject(ObjectId),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

enum Command {
    Add { shape: Shape, reply: oneshot::Sender<Result<ObjectId, SessionError>> },
    Update { id: ObjectId, shape: Shape, reply: oneshot::Sender<Result<(), SessionError>> },
    Remove { id: ObjectId, reply: oneshot::Sender<Result<(), SessionError>> },
    Cursor(Option<Cursor>),
    Undo(oneshot::Sender<bool>),
    Redo(oneshot::Sender<bool>),
    Snapshot(oneshot::Sender<Vec<(ObjectId, Shape)>>),
    Peers(oneshot::Sender<Vec<PeerPresence>>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Receiver<ConnectionStatus>,
    peer_id: PeerId,
}

impl SessionHandle {
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until the session has completed a bootstrap with the relay.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session stops first.
    pub async fn wait_connected(&self) -> Result<(), SessionError> {
        let mut status = self.status.clone();
        status
            .wait_for(|s| *s == ConnectionStatus::Connected)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Closed)
    }

    /// Add a shape under a fresh object id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn add(&self, shape: Shape) -> Result<ObjectId, SessionError> {
        self.request(|reply| Command::Add { shape, reply }).await?
    }

    /// # Errors
    ///
    /// Returns [`SessionError::UnknownObject`] for a missing or deleted id.
    pub async fn update(&self, id: ObjectId, shape: Shape) -> Result<(), SessionError> {
        self.request(|reply| Command::Update { id, shape, reply }).await?
    }

    /// # Errors
    ///
    /// Returns [`SessionError::UnknownObject`] for a missing or deleted id.
    pub async fn remove(&self, id: ObjectId) -> Result<(), SessionError> {
        self.request(|reply| Command::Remove { id, reply }).await?
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn set_cursor(&self, cursor: Option<Cursor>) -> Result<(), SessionError> {
        self.commands.send(Command::Cursor(cursor)).await.map_err(|_| SessionError::Closed)
    }

    /// Returns whether anything was undone.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn undo(&self) -> Result<bool, SessionError> {
        self.request(Command::Undo).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn redo(&self) -> Result<bool, SessionError> {
        self.request(Command::Redo).await
    }

    /// Current scene objects with their ids.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn snapshot(&self) -> Result<Vec<(ObjectId, Shape)>, SessionError> {
        self.request(Command::Snapshot).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn peers(&self) -> Result<Vec<PeerPresence>, SessionError> {
        self.request(Command::Peers).await
    }

    /// Leave the room and stop the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session already stopped.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(build(tx)).await.map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

// =============================================================================
// SPAWN
// =============================================================================

/// Start a session for `board_id` and return its handle and task.
///
/// `identity` is this peer's presence; its peer id also breaks version
/// ties. With a `backend`, the saved board is adopted before the first
/// connection and the scene is auto-saved.
pub fn spawn<S>(
    config: ReplicaConfig,
    board_id: &str,
    scene: S,
    identity: PeerPresence,
    backend: Option<Arc<dyn PersistenceBackend>>,
) -> (SessionHandle, JoinHandle<()>)
where
    S: SceneGraph + Send + 'static,
    S::Handle: Send,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
    let peer_id = identity.peer_id.clone();

    let mut presence = PresenceChannel::new(identity, config.presence_ttl);
    let listener_events = event_tx.clone();
    presence.on_change(move |peers| publish(&listener_events, SessionEvent::Peers(peers.to_vec())));

    let actor = Actor {
        url: config.room_url(&room_name(board_id)),
        board_id: board_id.to_owned(),
        engine: SyncEngine::new(scene, peer_id.clone(), config.pending_ttl),
        presence,
        history: History::new(),
        autosave: AutoSave::new(config.autosave_delay),
        backend,
        link: Link::Idle { retry_at: Instant::now() },
        backoff: Backoff::new(config.reconnect_min, config.reconnect_max),
        ever_connected: false,
        events: event_tx.clone(),
        status: status_tx,
        config,
    };
    let task = tokio::spawn(actor.run(command_rx));

    let handle = SessionHandle { commands: command_tx, events: event_tx, status: status_rx, peer_id };
    (handle, task)
}

fn publish(events: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    if events.send(event).is_err() {
        trace!("no session event subscribers");
    }
}

fn reply<T>(tx: oneshot::Sender<T>, value: T) {
    if tx.send(value).is_err() {
        debug!("session caller went away before reply");
    }
}

// =============================================================================
// ACTOR
// =============================================================================

enum Link {
    Idle { retry_at: Instant },
    Dialing(JoinHandle<Result<Connection, TransportError>>),
    Up(Connection),
}

enum LinkEvent {
    RetryDue,
    Dialed(Result<Connection, TransportError>),
    Inbound(Result<Vec<u8>, TransportError>),
}

async fn next_link_event(link: &mut Link) -> LinkEvent {
    match link {
        Link::Idle { retry_at } => {
            sleep_until(*retry_at).await;
            LinkEvent::RetryDue
        }
        Link::Dialing(task) => LinkEvent::Dialed(match task.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::Task(e.to_string())),
        }),
        Link::Up(conn) => LinkEvent::Inbound(conn.recv().await),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Actor<S: SceneGraph> {
    config: ReplicaConfig,
    url: String,
    board_id: String,
    engine: SyncEngine<S>,
    presence: PresenceChannel,
    history: History,
    autosave: AutoSave,
    backend: Option<Arc<dyn PersistenceBackend>>,
    link: Link,
    backoff: Backoff,
    ever_connected: bool,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Sender<ConnectionStatus>,
}

impl<S> Actor<S>
where
    S: SceneGraph + Send + 'static,
    S::Handle: Send,
{
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.load().await;
        info!(board_id = %self.board_id, url = %self.url, peer = %self.engine.peer(), "session started");

        let start = Instant::now();
        let mut heartbeat = interval_at(start + self.config.heartbeat, self.config.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut liveness = interval_at(start + self.config.liveness_poll, self.config.liveness_poll);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let pending_at = self.engine.next_deadline();
            let save_at = self.autosave.deadline();
            tokio::select! {
                event = next_link_event(&mut self.link) => self.on_link_event(event).await,
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.shutdown().await;
                        reply(done, ());
                        return;
                    }
                    Some(command) => self.on_command(command).await,
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                _ = heartbeat.tick() => {
                    let frame = self.presence.announce();
                    self.send(frame).await;
                }
                _ = liveness.tick() => {
                    self.presence.expire(Instant::now());
                }
                () = sleep_until_opt(pending_at) => {
                    let changes = self.engine.expire_pending(Instant::now());
                    self.remote_changes(changes);
                }
                () = sleep_until_opt(save_at) => {
                    if self.autosave.take_due(Instant::now()) {
                        self.save().await;
                    }
                }
            }
        }
    }

    // =========================================================================
    // LINK
    // =========================================================================

    async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::RetryDue => {
                debug!(url = %self.url, "dialing relay");
                let url = self.url.clone();
                self.link = Link::Dialing(tokio::spawn(async move { Connection::connect(&url).await }));
            }
            LinkEvent::Dialed(Ok(conn)) => {
                info!(url = %self.url, "relay connection open");
                self.link = Link::Up(conn);
                self.backoff.reset();
                self.engine.begin_connection();
            }
            LinkEvent::Dialed(Err(e)) => {
                warn!(error = %e, "relay connect failed");
                self.go_idle();
            }
            LinkEvent::Inbound(Ok(frame)) => self.on_frame(&frame).await,
            LinkEvent::Inbound(Err(e)) => {
                match e {
                    TransportError::Closed => info!("relay connection closed"),
                    other => warn!(error = %other, "relay connection lost"),
                }
                self.go_idle();
            }
        }
    }

    fn go_idle(&mut self) {
        let delay = self.backoff.next_delay();
        self.link = Link::Idle { retry_at: Instant::now() + delay };
        self.presence.clear();
        let status = if self.ever_connected { ConnectionStatus::Reconnecting } else { ConnectionStatus::Connecting };
        self.set_status(status);
        debug!(?delay, "relay reconnect scheduled");
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if *self.status.borrow() != status {
            self.status.send_replace(status);
            publish(&self.events, SessionEvent::Status(status));
        }
    }

    /// Send on the open link. Frames sent while offline are dropped; the
    /// store keeps the edits and the next bootstrap pushes them.
    async fn send(&mut self, frame: Vec<u8>) {
        let Link::Up(conn) = &mut self.link else {
            trace!("offline; frame not sent");
            return;
        };
        if let Err(e) = conn.send(frame).await {
            warn!(error = %e, "relay send failed");
            self.go_idle();
        }
    }

    async fn on_frame(&mut self, frame: &[u8]) {
        let (tag, body) = match split_frame(frame) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        let now = Instant::now();
        match tag {
            Tag::Sync => match self.engine.handle_sync(body, now) {
                Ok(outcome) => {
                    for frame in outcome.outgoing {
                        self.send(frame).await;
                    }
                    self.remote_changes(outcome.changes);
                    if outcome.bootstrapped {
                        let announce = self.presence.announce();
                        self.send(announce).await;
                        self.ever_connected = true;
                        self.set_status(ConnectionStatus::Connected);
                    }
                }
                Err(e) => warn!(error = %e, "dropping sync frame"),
            },
            Tag::Awareness => {
                if let Err(e) = self.presence.receive(body, now) {
                    warn!(error = %e, "dropping awareness frame");
                }
            }
            Tag::Unknown(byte) => debug!(tag = byte, "ignoring frame with unknown tag"),
        }
    }

    fn remote_changes(&mut self, changes: Vec<SceneChange>) {
        if changes.is_empty() {
            return;
        }
        self.autosave.touch(Instant::now());
        publish(&self.events, SessionEvent::Remote(changes));
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    async fn on_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Add { shape, reply: tx } => {
                let id = Uuid::new_v4();
                let edit = self.engine.restore(id, Some(shape), now);
                let result = self.commit(edit).await;
                reply(tx, result.map(|()| id));
            }
            Command::Update { id, shape, reply: tx } => {
                let result = if self.engine.store().live_shape(&id).is_some() {
                    let edit = self.engine.restore(id, Some(shape), now);
                    self.commit(edit).await
                } else {
                    Err(SessionError::UnknownObject(id))
                };
                reply(tx, result);
            }
            Command::Remove { id, reply: tx } => {
                let result = if self.engine.store().live_shape(&id).is_some() {
                    let edit = self.engine.restore(id, None, now);
                    self.commit(edit).await
                } else {
                    Err(SessionError::UnknownObject(id))
                };
                reply(tx, result);
            }
            Command::Cursor(cursor) => {
                let frame = self.presence.set_cursor(cursor);
                self.send(frame).await;
            }
            Command::Undo(tx) => {
                let edit = self.history.undo(&mut self.engine, now);
                reply(tx, self.replay(edit).await);
            }
            Command::Redo(tx) => {
                let edit = self.history.redo(&mut self.engine, now);
                reply(tx, self.replay(edit).await);
            }
            Command::Snapshot(tx) => reply(tx, self.engine.objects()),
            Command::Peers(tx) => reply(tx, self.presence.peers()),
            Command::Shutdown(tx) => reply(tx, ()),
        }
    }

    async fn commit(&mut self, edit: Result<LocalEdit, SyncError>) -> Result<(), SessionError> {
        let edit = edit?;
        self.history.record(&edit);
        self.autosave.touch(Instant::now());
        self.send(edit.frame).await;
        Ok(())
    }

    async fn replay(&mut self, edit: Result<Option<LocalEdit>, SyncError>) -> bool {
        match edit {
            Ok(Some(edit)) => {
                self.autosave.touch(Instant::now());
                self.send(edit.frame).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "undo/redo edit could not be encoded");
                false
            }
        }
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    async fn load(&mut self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let board_id = self.board_id.clone();
        match tokio::task::spawn_blocking(move || backend.load_initial_state(&board_id)).await {
            Ok(Ok(Some(document))) => {
                let count = document.objects.len();
                for object in document.objects {
                    self.engine.adopt(object.id, object.shape);
                }
                info!(board_id = %self.board_id, objects = count, "adopted saved board");
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to load saved board"),
            Err(e) => warn!(error = %e, "load task failed"),
        }
    }

    async fn save(&mut self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let document = SceneDocument::new(self.engine.objects());
        let objects = document.objects.len();
        let board_id = self.board_id.clone();
        match tokio::task::spawn_blocking(move || backend.save_snapshot(&board_id, &document)).await {
            Ok(Ok(())) => publish(&self.events, SessionEvent::Saved { objects }),
            Ok(Err(e)) => warn!(error = %e, "auto-save failed"),
            Err(e) => warn!(error = %e, "save task failed"),
        }
    }

    async fn shutdown(&mut self) {
        let link = std::mem::replace(&mut self.link, Link::Idle { retry_at: Instant::now() });
        match link {
            Link::Up(mut conn) => {
                if let Err(e) = conn.send(self.presence.leave_frame()).await {
                    debug!(error = %e, "presence leave not sent");
                }
                conn.close().await;
            }
            Link::Dialing(task) => task.abort(),
            Link::Idle { .. } => {}
        }
        if self.autosave.flush() {
            self.save().await;
        }
        info!(board_id = %self.board_id, "session stopped");
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
