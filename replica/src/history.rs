//! Local undo/redo — scoped to edits this peer authored.
//!
//! DESIGN
//! ======
//! Each step remembers one object's state on both sides of a local edit and
//! the version that edit produced. A step is only replayable while the
//! store's winner for the object is still that version; once another peer
//! has written over it, undoing would silently discard their work, so the
//! step is dropped instead. Undo and redo are committed through the engine
//! as fresh local edits and replicate like any other change.

use std::collections::VecDeque;

use frames::{ObjectId, Shape, Version};
use tokio::time::Instant;
use tracing::debug;

use crate::engine::{LocalEdit, SyncEngine, SyncError};
use crate::scene::SceneGraph;

pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
struct Step {
    id: ObjectId,
    /// State restored by undo; `None` means the object did not exist.
    undo_to: Option<Shape>,
    /// State restored by redo.
    redo_to: Option<Shape>,
    /// Version currently expected in the store for this step to apply.
    version: Version,
}

#[derive(Debug, Default)]
pub struct History {
    undo: VecDeque<Step>,
    redo: Vec<Step>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed local edit. Clears the redo stack.
    pub fn record(&mut self, edit: &LocalEdit) {
        let step = Step {
            id: edit.id,
            undo_to: edit.before.as_ref().and_then(|r| r.shape().cloned()),
            redo_to: edit.after.shape().cloned(),
            version: edit.after.version.clone(),
        };
        if step.undo_to == step.redo_to {
            return;
        }
        self.undo.push_back(step);
        if self.undo.len() > MAX_HISTORY {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    #[cfg(test)]
    pub(crate) fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Revert the most recent still-current local edit. Steps superseded
    /// by remote edits are discarded on the way.
    ///
    /// # Errors
    ///
    /// Propagates [`SyncError::Encode`] from the engine.
    pub fn undo<S: SceneGraph>(&mut self, engine: &mut SyncEngine<S>, now: Instant) -> Result<Option<LocalEdit>, SyncError> {
        while let Some(step) = self.undo.pop_back() {
            if !is_current(engine, &step) {
                debug!(id = %step.id, "undo step superseded by remote edit");
                continue;
            }
            let edit = engine.restore(step.id, step.undo_to.clone(), now)?;
            self.redo.push(Step { version: edit.after.version.clone(), ..step });
            return Ok(Some(edit));
        }
        Ok(None)
    }

    /// Re-apply the most recently undone edit.
    ///
    /// # Errors
    ///
    /// Propagates [`SyncError::Encode`] from the engine.
    pub fn redo<S: SceneGraph>(&mut self, engine: &mut SyncEngine<S>, now: Instant) -> Result<Option<LocalEdit>, SyncError> {
        while let Some(step) = self.redo.pop() {
            if !is_current(engine, &step) {
                debug!(id = %step.id, "redo step superseded by remote edit");
                continue;
            }
            let edit = engine.restore(step.id, step.redo_to.clone(), now)?;
            self.undo.push_back(Step { version: edit.after.version.clone(), ..step });
            return Ok(Some(edit));
        }
        Ok(None)
    }
}

fn is_current<S: SceneGraph>(engine: &SyncEngine<S>, step: &Step) -> bool {
    engine.store().winner(&step.id) == Some(&step.version)
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
