//! Observable chain state events and snapshots

use chainstate_core::{BlockHash, ChainHead, ChainStateError, OperationKind, StartPoint, Tip};

/// Lifecycle phase of a chain state instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, loader not started
    Uninitialized,
    /// Reading persisted state
    Loading,
    /// Initial tip known; operations are processed
    Ready,
    /// Initialization failed; readiness will never be reached
    Failed,
}

/// Consistent view of the in-memory state, published after every change.
#[derive(Debug, Clone)]
pub struct ChainStateView {
    /// Current phase
    pub phase: Phase,
    /// In-memory head, including a retracted genesis parent
    pub head: ChainHead,
    /// In-memory tip
    pub tip: Option<Tip>,
    /// Last committed tip
    pub durable_tip: Option<Tip>,
    /// Start point, once loaded
    pub start: Option<StartPoint>,
    /// Why initialization failed, in the `Failed` phase
    pub init_error: Option<ChainStateError>,
}

impl ChainStateView {
    pub(crate) fn uninitialized() -> Self {
        Self {
            phase: Phase::Uninitialized,
            head: ChainHead::Empty,
            tip: None,
            durable_tip: None,
            start: None,
            init_error: None,
        }
    }
}

/// Outcome of an admitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// How the operation moved the chain
    pub kind: OperationKind,
    /// Tip after the operation
    pub tip: Option<Tip>,
    /// Whether the operation's writes were durably committed before return
    pub committed: bool,
}

/// Events broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum ChainStateEvent {
    /// Initialization finished
    Ready {
        /// Loaded tip
        tip: Option<Tip>,
        /// Loaded or bootstrapped start point
        start: StartPoint,
    },
    /// A record was applied
    Applied {
        /// Height of the applied record
        height: u64,
        /// Hash of the applied record
        hash: BlockHash,
    },
    /// A record was retracted
    Retracted {
        /// Height of the retracted record
        height: u64,
        /// Hash of the retracted record
        hash: BlockHash,
    },
    /// A transaction reached storage
    Committed {
        /// Durable tip after the commit
        tip: Option<Tip>,
        /// Operations made durable
        operations: usize,
    },
    /// An open transaction was discarded
    RolledBack {
        /// Tip restored in memory
        tip: Option<Tip>,
        /// Operations discarded
        operations: usize,
    },
    /// Process-level or per-operation error
    Error(ChainStateError),
}
