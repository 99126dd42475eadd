//! # Ingestion Pipeline
//!
//! One actor task per chain state instance. It owns the in-memory head, the
//! transaction coordinator and the commit scheduler, and processes commands
//! strictly one at a time:
//!
//! ```text
//! submit ─► kind check ─► validate_order ─► open tx/window ─► handler
//!                                                        │
//!                         rollback ◄── failure ──────────┤
//!                                                        ▼
//!                    commit (if due) ◄── stage head ◄── success
//! ```
//!
//! Deadline messages from the scheduler are only looked at between commands,
//! so a deadline never interrupts a running handler. If one fires mid-flight
//! the completing operation commits and the queued message is stale.

use std::sync::Arc;

use chainstate_core::{
    ChainHead, ChainStateError, ChainStorageEffects, Operation, OperationKind, StartPoint, Tip,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::{ChainStateConfig, ErrorPolicy, StorageLayout};
use crate::coordinator::{CommitSummary, TransactionCoordinator};
use crate::events::{Admission, ChainStateEvent, ChainStateView, Phase};
use crate::handler::{dispatch, ChainStateHandler};
use crate::loader::load_initial_state;
use crate::scheduler::{CommitScheduler, WindowId};
use crate::validator::validate_order;

type Reply<T> = oneshot::Sender<Result<T, ChainStateError>>;

/// Requests sent from `ChainState` handles to the actor.
pub(crate) enum Command<P> {
    Submit {
        op: Operation<P>,
        reply: Reply<Admission>,
    },
    Flush {
        reply: Reply<Option<Tip>>,
    },
    Finish {
        reply: Reply<Option<Tip>>,
    },
}

impl<P> Command<P> {
    fn reject(self, err: ChainStateError) {
        // Submitter may have given up waiting.
        match self {
            Command::Submit { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Command::Flush { reply } | Command::Finish { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// The actor state.
pub(crate) struct Pipeline<P> {
    storage: Arc<dyn ChainStorageEffects>,
    handler: Arc<dyn ChainStateHandler<P>>,
    config: ChainStateConfig,
    layout: StorageLayout,
    coordinator: TransactionCoordinator,
    scheduler: CommitScheduler,
    phase: Phase,
    head: ChainHead,
    start: Option<StartPoint>,
    halted: Option<ChainStateError>,
    view: watch::Sender<ChainStateView>,
    events: broadcast::Sender<ChainStateEvent>,
}

impl<P> Pipeline<P>
where
    P: Send + Sync + 'static,
{
    pub(crate) fn new(
        storage: Arc<dyn ChainStorageEffects>,
        handler: Arc<dyn ChainStateHandler<P>>,
        config: ChainStateConfig,
        scheduler: CommitScheduler,
        view: watch::Sender<ChainStateView>,
        events: broadcast::Sender<ChainStateEvent>,
    ) -> Self {
        let layout = config.layout();
        Self {
            storage,
            handler,
            coordinator: TransactionCoordinator::new(layout.clone(), ChainHead::Empty),
            layout,
            config,
            scheduler,
            phase: Phase::Uninitialized,
            head: ChainHead::Empty,
            start: None,
            halted: None,
            view,
            events,
        }
    }

    /// Load, then serve commands until finished or every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command<P>>,
        mut deadlines: mpsc::UnboundedReceiver<WindowId>,
    ) {
        if let Err(err) = self.initialize().await {
            tracing::error!(error = %err, "Chain state initialization failed");
            self.emit(ChainStateEvent::Error(err.clone()));
            while let Some(command) = commands.recv().await {
                command.reject(err.clone());
            }
            return;
        }

        loop {
            tokio::select! {
                biased;
                Some(window) = deadlines.recv() => self.on_deadline(window).await,
                command = commands.recv() => match command {
                    Some(Command::Submit { op, reply }) => {
                        let result = self.submit(op).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Flush { reply }) => {
                        let result = self.flush().await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Finish { reply }) => {
                        let result = self.finish().await;
                        let _ = reply.send(result);
                        break;
                    }
                    None => {
                        // Every handle dropped: same as an explicit finish.
                        let _ = self.finish().await;
                        break;
                    }
                }
            }
        }

        commands.close();
        while let Ok(command) = commands.try_recv() {
            command.reject(ChainStateError::Closed);
        }
    }

    async fn initialize(&mut self) -> Result<(), ChainStateError> {
        self.phase = Phase::Loading;
        self.publish();

        let loaded = load_initial_state(
            self.storage.as_ref(),
            &self.layout,
            self.config.start.as_ref(),
        )
        .await;

        let initial = match loaded {
            Ok(initial) => initial,
            Err(e) => {
                let err = ChainStateError::from(e);
                self.phase = Phase::Failed;
                self.view.send_modify(|view| {
                    view.phase = Phase::Failed;
                    view.init_error = Some(err.clone());
                });
                return Err(err);
            }
        };

        self.head = initial.head;
        self.start = Some(initial.start.clone());
        self.coordinator = TransactionCoordinator::new(self.layout.clone(), initial.head);
        self.phase = Phase::Ready;
        self.publish();

        tracing::info!(
            head = %initial.head,
            start_height = initial.start.height,
            commit_interval_ms = self.scheduler.interval_ms(),
            "Chain state ready"
        );
        self.emit(ChainStateEvent::Ready {
            tip: initial.head.tip(),
            start: initial.start,
        });
        Ok(())
    }

    async fn submit(&mut self, op: Operation<P>) -> Result<Admission, ChainStateError> {
        if let Some(reason) = &self.halted {
            return Err(ChainStateError::halted(reason));
        }

        let result = self.process(op).await;
        if let Err(err) = &result {
            self.emit(ChainStateEvent::Error(err.clone()));
            if self.config.error_policy == ErrorPolicy::Halt {
                self.halt(err.clone()).await;
            }
        }
        result
    }

    async fn process(&mut self, op: Operation<P>) -> Result<Admission, ChainStateError> {
        let kind = op.require_kind()?;

        if let Err(violation) = validate_order(&self.head, kind, &op) {
            tracing::warn!(
                %kind,
                height = op.height,
                head = %self.head,
                error = %violation,
                "Rejected out-of-order operation"
            );
            return Err(violation.into());
        }

        if self.coordinator.ensure_open(self.storage.as_ref()) {
            self.scheduler.open_window();
        }

        let outcome = match self.coordinator.transaction_mut() {
            Some(tx) => dispatch(self.handler.as_ref(), kind, &op, tx).await,
            None => Err(anyhow::anyhow!("no open transaction")),
        };

        if let Err(e) = outcome {
            let message = format!("{e:#}");
            let summary = self.coordinator.rollback(&message);
            self.scheduler.close_window();
            self.head = summary.restore;
            self.publish();

            tracing::warn!(
                %kind,
                height = op.height,
                rolled_back = summary.operations,
                restored = %summary.restore,
                error = %message,
                "Handler failed, transaction rolled back"
            );
            self.emit(ChainStateEvent::RolledBack {
                tip: summary.restore.tip(),
                operations: summary.operations,
            });
            return Err(ChainStateError::Callback {
                kind,
                height: op.height,
                message,
                reverted: summary.operations + 1,
            });
        }

        let next = ChainHead::after(kind, &op);
        self.coordinator.stage_head(next);
        self.head = next;
        self.publish();

        tracing::debug!(%kind, height = op.height, hash = %op.hash, "Admitted operation");
        self.emit(match kind {
            OperationKind::Apply => ChainStateEvent::Applied {
                height: op.height,
                hash: op.hash,
            },
            OperationKind::Retract => ChainStateEvent::Retracted {
                height: op.height,
                hash: op.hash,
            },
        });

        let committed = if self.scheduler.commit_due() {
            self.commit_open().await?;
            true
        } else {
            false
        };

        Ok(Admission {
            kind,
            tip: next.tip(),
            committed,
        })
    }

    /// Commit the open transaction, if any, and close its window.
    ///
    /// A failed commit loses the batch, so the in-memory head falls back to
    /// the durable head.
    async fn commit_open(&mut self) -> Result<Option<CommitSummary>, ChainStateError> {
        let operations = self.coordinator.pending_operations();
        let result = self.coordinator.commit(self.storage.as_ref(), self.head).await;
        self.scheduler.close_window();

        match result {
            Ok(Some(summary)) => {
                self.publish();
                self.emit(ChainStateEvent::Committed {
                    tip: summary.head.tip(),
                    operations: summary.operations,
                });
                Ok(Some(summary))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                let restored = self.coordinator.durable_head();
                self.head = restored;
                self.publish();
                tracing::error!(
                    error = %e,
                    operations,
                    %restored,
                    "Chain state commit failed"
                );
                self.emit(ChainStateEvent::RolledBack {
                    tip: restored.tip(),
                    operations,
                });
                Err(e.into())
            }
        }
    }

    async fn on_deadline(&mut self, window: WindowId) {
        if !self.scheduler.is_current(window) || !self.coordinator.is_open() {
            tracing::trace!(window, "Ignoring stale commit deadline");
            return;
        }

        tracing::debug!(
            window,
            operations = self.coordinator.pending_operations(),
            "Commit window deadline reached"
        );
        if let Err(err) = self.commit_open().await {
            // Nobody is waiting on these operations any more.
            self.emit(ChainStateEvent::Error(err.clone()));
            if self.config.error_policy == ErrorPolicy::Halt && self.halted.is_none() {
                self.halted = Some(err);
            }
        }
    }

    async fn halt(&mut self, err: ChainStateError) {
        if self.halted.is_some() {
            return;
        }
        // Operations admitted before the failure stay admitted.
        if let Err(commit_err) = self.commit_open().await {
            self.emit(ChainStateEvent::Error(commit_err));
        }
        tracing::warn!(error = %err, head = %self.head, "Chain state halted");
        self.halted = Some(err);
    }

    async fn flush(&mut self) -> Result<Option<Tip>, ChainStateError> {
        self.commit_open().await?;
        Ok(self.coordinator.durable_tip())
    }

    async fn finish(&mut self) -> Result<Option<Tip>, ChainStateError> {
        let committed = self.commit_open().await;
        tracing::info!(
            head = %self.head,
            durable = %self.coordinator.durable_head(),
            "Chain state finished"
        );
        committed?;
        match &self.halted {
            Some(reason) => Err(ChainStateError::halted(reason)),
            None => Ok(self.head.tip()),
        }
    }

    fn publish(&self) {
        self.view.send_modify(|view| {
            view.phase = self.phase;
            view.head = self.head;
            view.tip = self.head.tip();
            view.durable_tip = self.coordinator.durable_tip();
            view.start = self.start.clone();
        });
    }

    fn emit(&self, event: ChainStateEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
