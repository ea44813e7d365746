//! Client Session - Reconciliation Engine
//!
//! Holds the last confirmed canvas state plus the speculative local fork,
//! and keeps the rendered state equal to `confirmed + fork` at all times.
//!
//! A remote command is logically ordered *before* the fork: the session
//! applies it to the confirmed state and replays the fork on top, so once
//! every fork entry is confirmed the rendered state exactly matches the
//! server's.

use easel_canvas::{CanvasState, Snapshot};
use easel_protocol::{Command, SequencedCommand, UserId};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fork::{ForkConfig, LocalFork};

/// Synchronization status, surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Fork empty; rendered state equals confirmed state
    Idle,
    /// Fork non-empty; local commands await acknowledgment
    Speculating,
    /// A remote command is being merged under the fork
    Reconciling,
    /// The fork was dropped; a catch-up from the server is in progress
    Resyncing,
}

/// A command queued for transmission to the server
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Id the server will echo back for fork matching
    pub client_local_id: u64,
    /// The command to send
    pub command: Command,
}

/// Per-client synchronization state machine
pub struct ClientSession {
    user_id: UserId,
    confirmed: CanvasState,
    rendered: CanvasState,
    confirmed_sequence: u64,
    fork: LocalFork,
    config: ForkConfig,
    status: SyncStatus,
}

impl ClientSession {
    /// Create a session from the welcome baseline
    #[must_use]
    pub fn new(user_id: UserId, baseline: Snapshot, config: ForkConfig) -> Self {
        let confirmed = baseline.state;
        Self {
            user_id,
            rendered: confirmed.clone(),
            confirmed,
            confirmed_sequence: baseline.sequence,
            fork: LocalFork::new(),
            config,
            status: SyncStatus::Idle,
        }
    }

    /// The locally rendered state: confirmed prefix plus unconfirmed fork
    #[must_use]
    pub fn canvas(&self) -> &CanvasState {
        &self.rendered
    }

    /// The last server-confirmed state
    #[must_use]
    pub fn confirmed(&self) -> &CanvasState {
        &self.confirmed
    }

    /// Sequence number of the last confirmed command
    #[must_use]
    pub fn confirmed_sequence(&self) -> u64 {
        self.confirmed_sequence
    }

    /// Current synchronization status
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Number of commands awaiting acknowledgment
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.fork.len()
    }

    /// This client's user id
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Apply a local user action speculatively and queue it for
    /// submission.
    ///
    /// If the fork budget would be exceeded, the entire fork is discarded
    /// (fallbehind), the rendered state rewinds to the confirmed state and
    /// the session enters `Resyncing`; the caller must request a catch-up.
    pub fn submit_local(&mut self, command: Command) -> Result<Submission> {
        if self.status == SyncStatus::Resyncing {
            return Err(Error::Resyncing);
        }

        let bytes = command.encoded_len();
        if self.fork.would_exceed(&self.config, bytes) {
            let pending = self.fork.len();
            self.drop_fork();
            warn!(pending, "fork budget exceeded, dropping fork");
            return Err(Error::ForkDropped {
                pending,
                resync_from: self.confirmed_sequence,
            });
        }

        self.rendered.apply(&command)?;
        let client_local_id = self.fork.push(command.clone());
        self.status = SyncStatus::Speculating;
        Ok(Submission {
            client_local_id,
            command,
        })
    }

    /// Consume one sequenced command from the server broadcast stream
    pub fn handle_remote(&mut self, sc: &SequencedCommand) -> Result<()> {
        if sc.sequence <= self.confirmed_sequence {
            // Duplicate delivery (e.g. broadcast overlapping a catch-up)
            return Ok(());
        }
        if sc.sequence != self.confirmed_sequence + 1 {
            return Err(Error::OutOfSequence {
                expected: self.confirmed_sequence + 1,
                got: sc.sequence,
            });
        }

        let is_own_ack = sc.user_id == self.user_id
            && self
                .fork
                .head()
                .is_some_and(|h| h.client_local_id == sc.client_local_id);

        apply_or_skip(&mut self.confirmed, &sc.command, sc.sequence);
        self.confirmed_sequence = sc.sequence;

        if is_own_ack {
            // Already reflected in the rendered state.
            self.fork.pop_head();
            if self.fork.is_empty() {
                self.rendered = self.confirmed.clone();
                self.status = SyncStatus::Idle;
            }
            return Ok(());
        }

        // Foreign command: rewind to confirmed and replay the fork on top.
        self.status = SyncStatus::Reconciling;
        self.rendered = self.confirmed.clone();
        for entry in self.fork.iter() {
            apply_or_skip(&mut self.rendered, &entry.command, sc.sequence);
        }
        self.status = if self.fork.is_empty() {
            SyncStatus::Idle
        } else {
            SyncStatus::Speculating
        };
        Ok(())
    }

    /// Adopt a server-driven history reset (autoreset).
    ///
    /// Returns `true` if a non-empty fork had to be discarded; the caller
    /// should surface that as a fork-dropped status.
    pub fn handle_reset(&mut self, baseline: Snapshot) -> bool {
        let dropped = !self.fork.is_empty();
        if dropped {
            info!(
                pending = self.fork.len(),
                sequence = baseline.sequence,
                "history reset with pending fork, discarding"
            );
            self.fork.clear();
        }
        self.confirmed_sequence = baseline.sequence;
        self.confirmed = baseline.state;
        self.rendered = self.confirmed.clone();
        self.status = SyncStatus::Idle;
        dropped
    }

    /// Begin consuming a catch-up suffix after a fork drop or reconnect
    pub fn apply_catch_up(&mut self, sc: &SequencedCommand) -> Result<()> {
        if sc.sequence <= self.confirmed_sequence {
            return Ok(());
        }
        if sc.sequence != self.confirmed_sequence + 1 {
            return Err(Error::OutOfSequence {
                expected: self.confirmed_sequence + 1,
                got: sc.sequence,
            });
        }
        apply_or_skip(&mut self.confirmed, &sc.command, sc.sequence);
        self.confirmed_sequence = sc.sequence;
        Ok(())
    }

    /// Complete a catch-up; the session becomes idle at `sequence`
    pub fn finish_catch_up(&mut self, sequence: u64) -> Result<()> {
        if sequence != self.confirmed_sequence {
            return Err(Error::OutOfSequence {
                expected: self.confirmed_sequence,
                got: sequence,
            });
        }
        self.rendered = self.confirmed.clone();
        self.status = SyncStatus::Idle;
        debug!(sequence, "catch-up complete");
        Ok(())
    }

    /// Discard the fork and rewind the rendered state to the confirmed
    /// state, entering `Resyncing`
    pub fn drop_fork(&mut self) {
        self.fork.clear();
        self.rendered = self.confirmed.clone();
        self.status = SyncStatus::Resyncing;
    }

    /// Verify the fork-safety invariant: replaying the fork over the
    /// confirmed state reproduces the rendered state
    #[must_use]
    pub fn fork_replay_matches_rendered(&self) -> bool {
        let mut replay = self.confirmed.clone();
        for entry in self.fork.iter() {
            let _ = replay.apply(&entry.command);
        }
        replay == self.rendered
    }
}

/// Apply a command, treating recoverable failures as a logged no-op so the
/// replica stays convergent with peers that could apply it.
fn apply_or_skip(state: &mut CanvasState, command: &Command, sequence: u64) {
    if let Err(e) = state.apply(command) {
        warn!(
            sequence,
            kind = command.kind(),
            error = %e,
            "skipping inapplicable command"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_protocol::{Color, LayerId, Rect};

    fn baseline() -> Snapshot {
        let mut state = CanvasState::new(8, 8);
        state
            .apply(&Command::CreateLayer {
                id: LayerId(1),
                title: "Background".into(),
                insert_above: None,
            })
            .unwrap();
        Snapshot::new(0, state)
    }

    fn fill(layer: u32, color: u32) -> Command {
        Command::FillRegion {
            layer: LayerId(layer),
            rect: Rect::new(0, 0, 2, 2),
            color: Color(color),
        }
    }

    fn session(user: u16) -> ClientSession {
        ClientSession::new(UserId(user), baseline(), ForkConfig::default())
    }

    #[test]
    fn test_local_submit_speculates() {
        let mut s = session(1);
        let sub = s.submit_local(fill(1, 0xAA)).unwrap();
        assert_eq!(s.status(), SyncStatus::Speculating);
        assert_eq!(s.pending_count(), 1);
        assert_eq!(sub.client_local_id, 1);
        // Rendered reflects the edit, confirmed does not
        assert_ne!(s.canvas(), s.confirmed());
        assert!(s.fork_replay_matches_rendered());
    }

    #[test]
    fn test_own_ack_confirms_and_idles() {
        let mut s = session(1);
        let sub = s.submit_local(fill(1, 0xAA)).unwrap();
        s.handle_remote(&SequencedCommand::new(
            1,
            UserId(1),
            sub.client_local_id,
            sub.command,
        ))
        .unwrap();
        assert_eq!(s.status(), SyncStatus::Idle);
        assert_eq!(s.pending_count(), 0);
        assert_eq!(s.canvas(), s.confirmed());
        assert_eq!(s.confirmed_sequence(), 1);
    }

    #[test]
    fn test_foreign_command_is_ordered_before_fork() {
        let mut s = session(1);
        let sub = s.submit_local(fill(1, 0xAA)).unwrap();

        // Another user's fill on the same region arrives first
        s.handle_remote(&SequencedCommand::new(1, UserId(2), 5, fill(1, 0xBB)))
            .unwrap();
        assert_eq!(s.status(), SyncStatus::Speculating);
        // The local fill wins in the rendered state (fork on top)
        let rendered = s.canvas().layer(LayerId(1)).unwrap();
        assert_eq!(rendered.pixels[0], 0xAA);
        let confirmed = s.confirmed().layer(LayerId(1)).unwrap();
        assert_eq!(confirmed.pixels[0], 0xBB);
        assert!(s.fork_replay_matches_rendered());

        // Once our own command is confirmed, rendered == confirmed
        s.handle_remote(&SequencedCommand::new(
            2,
            UserId(1),
            sub.client_local_id,
            sub.command,
        ))
        .unwrap();
        assert_eq!(s.status(), SyncStatus::Idle);
        assert_eq!(s.canvas(), s.confirmed());
    }

    #[test]
    fn test_concurrent_delete_skips_fill() {
        // §8 scenario: B deletes layer 1 before A's fill is sequenced
        let mut a = session(1);
        let mut b = session(2);

        let fill_sub = a.submit_local(fill(1, 0xAA)).unwrap();
        let del_sub = b
            .submit_local(Command::DeleteLayer { id: LayerId(1) })
            .unwrap();

        let seq100 = SequencedCommand::new(1, UserId(2), del_sub.client_local_id, del_sub.command);
        let seq101 = SequencedCommand::new(2, UserId(1), fill_sub.client_local_id, fill_sub.command);

        for sc in [&seq100, &seq101] {
            a.handle_remote(sc).unwrap();
            b.handle_remote(sc).unwrap();
        }

        assert_eq!(a.status(), SyncStatus::Idle);
        assert_eq!(b.status(), SyncStatus::Idle);
        assert_eq!(a.canvas(), b.canvas());
        assert!(a.canvas().layer(LayerId(1)).is_none());
    }

    #[test]
    fn test_fallbehind_drops_fork_at_limit() {
        let config = ForkConfig {
            max_commands: 20,
            max_bytes: usize::MAX,
        };
        let mut s = ClientSession::new(UserId(1), baseline(), config);
        for _ in 0..20 {
            s.submit_local(fill(1, 0x11)).unwrap();
        }
        let err = s.submit_local(fill(1, 0x22)).unwrap_err();
        match err {
            Error::ForkDropped {
                pending,
                resync_from,
            } => {
                assert_eq!(pending, 20);
                assert_eq!(resync_from, 0);
            }
            other => unreachable!("expected ForkDropped, got {:?}", other),
        }
        assert_eq!(s.status(), SyncStatus::Resyncing);
        assert_eq!(s.pending_count(), 0);
        assert_eq!(s.canvas(), s.confirmed());

        // Local edits stay suspended until the catch-up completes
        assert!(matches!(
            s.submit_local(fill(1, 0x33)),
            Err(Error::Resyncing)
        ));
        s.finish_catch_up(0).unwrap();
        assert_eq!(s.status(), SyncStatus::Idle);
        s.submit_local(fill(1, 0x33)).unwrap();
    }

    #[test]
    fn test_catch_up_applies_suffix() {
        let mut s = session(1);
        s.drop_fork();
        s.apply_catch_up(&SequencedCommand::new(1, UserId(2), 1, fill(1, 0xCC)))
            .unwrap();
        s.apply_catch_up(&SequencedCommand::new(2, UserId(2), 2, fill(1, 0xDD)))
            .unwrap();
        s.finish_catch_up(2).unwrap();
        assert_eq!(s.status(), SyncStatus::Idle);
        assert_eq!(s.confirmed_sequence(), 2);
        assert_eq!(s.canvas().layer(LayerId(1)).unwrap().pixels[0], 0xDD);
    }

    #[test]
    fn test_out_of_sequence_is_detected() {
        let mut s = session(1);
        let err = s
            .handle_remote(&SequencedCommand::new(5, UserId(2), 1, fill(1, 1)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfSequence {
                expected: 1,
                got: 5
            }
        ));
    }

    #[test]
    fn test_duplicate_delivery_is_ignored() {
        let mut s = session(1);
        let sc = SequencedCommand::new(1, UserId(2), 1, fill(1, 1));
        s.handle_remote(&sc).unwrap();
        s.handle_remote(&sc).unwrap();
        assert_eq!(s.confirmed_sequence(), 1);
    }

    #[test]
    fn test_reset_with_pending_fork_drops_it() {
        let mut s = session(1);
        s.submit_local(fill(1, 0xAA)).unwrap();

        let mut new_base = CanvasState::new(8, 8);
        new_base
            .apply(&Command::CreateLayer {
                id: LayerId(1),
                title: "Background".into(),
                insert_above: None,
            })
            .unwrap();
        let dropped = s.handle_reset(Snapshot::new(50, new_base));
        assert!(dropped);
        assert_eq!(s.status(), SyncStatus::Idle);
        assert_eq!(s.confirmed_sequence(), 50);
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn test_reset_with_empty_fork_is_clean() {
        let mut s = session(1);
        let dropped = s.handle_reset(Snapshot::new(10, CanvasState::new(4, 4)));
        assert!(!dropped);
        assert_eq!(s.confirmed_sequence(), 10);
    }

    #[test]
    fn test_unapplied_local_command_is_not_queued() {
        let mut s = session(1);
        let err = s.submit_local(fill(9, 0xAA)).unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
        assert_eq!(s.pending_count(), 0);
        assert_eq!(s.status(), SyncStatus::Idle);
    }
}
