//! Replica — one peer's side of a shared board.
//!
//! Layers, leaf first: [`store`] keeps the convergent object map, [`scene`]
//! is the seam to whatever draws the objects, [`engine`] reconciles the two,
//! [`presence`] tracks other peers' cursors, [`history`] scopes undo to local
//! edits, [`persistence`] saves snapshots, [`transport`] speaks to the
//! relay, and [`session`] runs all of it as one actor task.

pub mod board;
pub mod config;
pub mod engine;
pub mod history;
pub mod persistence;
pub mod presence;
pub mod scene;
pub mod session;
pub mod store;
pub mod transport;

pub use config::{ConfigError, ReplicaConfig};
pub use engine::{LocalChange, LocalEdit, SceneChange, SyncEngine, SyncError, SyncOutcome};
pub use persistence::{JsonFileBackend, PersistenceBackend, PersistenceError, SceneDocument};
pub use presence::PresenceChannel;
pub use scene::{MemoryScene, SceneGraph, SceneHandle};
pub use session::{ConnectionStatus, SessionError, SessionEvent, SessionHandle};
pub use store::{ApplyOutcome, ObjectStore};
pub use transport::TransportError;
