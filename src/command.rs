use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::config::{TerrainShape, Viewpoint};

/// Snapshot commands from the control side. A later command of the same kind
/// fully supersedes an earlier unconsumed one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    SetViewpoint { viewpoint: Viewpoint, radius: f32 },
    SetRenderDistance { distance: u32 },
    SetTerrainShape { shape: TerrainShape },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Viewpoint,
    RenderDistance,
    TerrainShape,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SetViewpoint { .. } => CommandKind::Viewpoint,
            Command::SetRenderDistance { .. } => CommandKind::RenderDistance,
            Command::SetTerrainShape { .. } => CommandKind::TerrainShape,
        }
    }
}

/// Latest unconsumed command of each kind.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PendingCommands {
    pub viewpoint: Option<(Viewpoint, f32)>,
    pub render_distance: Option<u32>,
    pub shape: Option<TerrainShape>,
}

impl PendingCommands {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.viewpoint.is_some() as usize
            + self.render_distance.is_some() as usize
            + self.shape.is_some() as usize
    }

    /// Returns true when an unconsumed command of the same kind was replaced.
    fn store(&mut self, command: Command) -> bool {
        match command {
            Command::SetViewpoint { viewpoint, radius } => {
                self.viewpoint.replace((viewpoint, radius)).is_some()
            }
            Command::SetRenderDistance { distance } => {
                self.render_distance.replace(distance).is_some()
            }
            Command::SetTerrainShape { shape } => self.shape.replace(shape).is_some(),
        }
    }
}

impl IntoIterator for PendingCommands {
    type Item = Command;
    type IntoIter = std::iter::Flatten<std::array::IntoIter<Option<Command>, 3>>;

    fn into_iter(self) -> Self::IntoIter {
        [
            self.shape.map(|shape| Command::SetTerrainShape { shape }),
            self.render_distance
                .map(|distance| Command::SetRenderDistance { distance }),
            self.viewpoint
                .map(|(viewpoint, radius)| Command::SetViewpoint { viewpoint, radius }),
        ]
        .into_iter()
        .flatten()
    }
}

/// Coalescing control -> generation channel with one slot per command kind.
/// Neither side ever waits on the other; the lock is held only for a swap.
#[derive(Debug, Default)]
pub struct CommandChannel {
    pending: Mutex<PendingCommands>,
    coalesced: AtomicU64,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, command: Command) {
        let replaced = self.pending.lock().store(command);
        if replaced {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            trace!(kind = ?command.kind(), "superseded unconsumed command");
        }
    }

    /// Take every pending command, leaving all slots empty.
    pub fn drain(&self) -> PendingCommands {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Number of commands dropped because a newer one of the same kind arrived.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}
