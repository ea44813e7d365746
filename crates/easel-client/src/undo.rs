//! Undo/Redo Manager
//!
//! Per-user undo over the shared log. Undo never rewrites history: it
//! submits compensating commands through the normal pipeline, so other
//! users' intervening edits are preserved and undo itself is forward
//! progress in the log.
//!
//! Inverses are captured when a command is confirmed (the pre-application
//! state is known then); at undo time they are re-checked against current
//! state, because a later command may have structurally removed a target.

use easel_canvas::CanvasState;
use easel_protocol::{Command, SequencedCommand, UserId};
use tracing::debug;

use crate::error::{Error, Result};

/// Default cap on retained undo groups per user
pub const DEFAULT_MAX_GROUPS: usize = 64;

/// One confirmed command of the local user together with the inverse
/// captured at confirmation time (None when no inverse existed)
#[derive(Debug, Clone)]
struct GroupEntry {
    command: Command,
    inverse: Option<Command>,
}

/// A contiguous run of one user's commands undone as a unit
#[derive(Debug, Clone, Default)]
pub struct UndoGroup {
    entries: Vec<GroupEntry>,
}

impl UndoGroup {
    /// Number of commands in the group
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the group contains no commands
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-user undo/redo stacks over confirmed history
pub struct UndoManager {
    user_id: UserId,
    open: Option<UndoGroup>,
    undo_stack: Vec<UndoGroup>,
    redo_stack: Vec<UndoGroup>,
    max_groups: usize,
}

impl UndoManager {
    /// Create a manager tracking one user's commands
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            open: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_groups: DEFAULT_MAX_GROUPS,
        }
    }

    /// Configure the retained group cap (oldest groups are discarded
    /// first)
    #[must_use]
    pub fn with_max_groups(mut self, max: usize) -> Self {
        self.max_groups = max;
        self
    }

    /// Open a new undo group for an interactive action, closing any group
    /// still open
    pub fn begin_group(&mut self) {
        self.close_open();
        self.open = Some(UndoGroup::default());
    }

    /// Close the current undo group
    pub fn end_group(&mut self) {
        self.close_open();
    }

    fn close_open(&mut self) {
        if let Some(group) = self.open.take() {
            if !group.is_empty() {
                self.undo_stack.push(group);
                self.redo_stack.clear();
                if self.undo_stack.len() > self.max_groups {
                    let overflow = self.undo_stack.len() - self.max_groups;
                    self.undo_stack.drain(0..overflow);
                }
            }
        }
    }

    /// Observe a confirmed command together with the state it was applied
    /// to. Only the local user's commands inside an open group are
    /// recorded; an `UndoPoint` closes the current group and opens the
    /// next.
    pub fn observe(&mut self, sc: &SequencedCommand, state_before: &CanvasState) {
        if sc.user_id != self.user_id {
            return;
        }
        if matches!(sc.command, Command::UndoPoint) {
            self.begin_group();
            return;
        }
        if let Some(group) = &mut self.open {
            let inverse = state_before.inverse(&sc.command);
            group.entries.push(GroupEntry {
                command: sc.command.clone(),
                inverse,
            });
        }
    }

    /// Whether an undo group is available
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
            || self.open.as_ref().is_some_and(|g| !g.is_empty())
    }

    /// Whether a redo group is available
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Compute the compensating commands that undo the most recent group.
    ///
    /// The compensations are validated against `state` by trial
    /// application; if any target was structurally removed by a later
    /// command, `UndoUnavailable` is returned and nothing changes. On
    /// success the group moves to the redo stack and the returned commands
    /// must be submitted through the normal pipeline.
    pub fn undo(&mut self, state: &CanvasState) -> Result<Vec<Command>> {
        self.close_open();
        let group = self
            .undo_stack
            .last()
            .ok_or_else(|| Error::UndoUnavailable("nothing to undo".into()))?;

        let mut compensations = Vec::new();
        let mut probe = state.clone();
        for entry in group.entries.iter().rev() {
            if !entry.command.is_undoable() {
                continue;
            }
            let inverse = entry.inverse.clone().ok_or_else(|| {
                Error::UndoUnavailable(format!(
                    "{} had no inverse when confirmed",
                    entry.command.kind()
                ))
            })?;
            probe.apply(&inverse).map_err(|e| {
                Error::UndoUnavailable(format!(
                    "inverse of {} no longer applies: {e}",
                    entry.command.kind()
                ))
            })?;
            compensations.push(inverse);
        }

        let group = self.undo_stack.pop().unwrap_or_default();
        debug!(commands = compensations.len(), "undo group inverted");
        self.redo_stack.push(group);
        Ok(compensations)
    }

    /// Compute the commands that redo the most recently undone group.
    ///
    /// The original commands are re-validated against `state`; if an
    /// intervening edit makes them inapplicable, `UndoUnavailable` is
    /// returned and nothing changes. On success the group moves back to
    /// the undo stack.
    pub fn redo(&mut self, state: &CanvasState) -> Result<Vec<Command>> {
        let group = self
            .redo_stack
            .last()
            .ok_or_else(|| Error::UndoUnavailable("nothing to redo".into()))?;

        let mut commands = Vec::new();
        let mut probe = state.clone();
        for entry in &group.entries {
            if !entry.command.is_undoable() {
                continue;
            }
            probe.apply(&entry.command).map_err(|e| {
                Error::UndoUnavailable(format!(
                    "{} no longer applies: {e}",
                    entry.command.kind()
                ))
            })?;
            commands.push(entry.command.clone());
        }

        let group = self.redo_stack.pop().unwrap_or_default();
        debug!(commands = commands.len(), "undo group re-applied");
        self.undo_stack.push(group);
        Ok(commands)
    }

    /// Number of closed groups available for undo
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of groups available for redo
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }
}
