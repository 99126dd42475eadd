//! Public chain state handle
//!
//! `ChainState` is a cheap, cloneable handle onto one pipeline task. Reads
//! come from the last published view and never wait on the pipeline;
//! mutations are queued and answered in submission order.

use std::sync::Arc;

use chainstate_core::{
    BlockHash, ChainHead, ChainStateError, ChainStorageEffects, Operation, PhysicalTimeEffects, Result,
    StartPoint, Tip,
};
use chainstate_effects::TokioTimeHandler;
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::ChainStateConfig;
use crate::events::{Admission, ChainStateEvent, ChainStateView, Phase};
use crate::handler::ChainStateHandler;
use crate::pipeline::{Command, Pipeline};
use crate::scheduler::CommitScheduler;

/// Handle to a running chain state instance.
pub struct ChainState<P> {
    commands: mpsc::Sender<Command<P>>,
    view: watch::Receiver<ChainStateView>,
    events: broadcast::Sender<ChainStateEvent>,
}

impl<P> Clone for ChainState<P> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            view: self.view.clone(),
            events: self.events.clone(),
        }
    }
}

impl<P> std::fmt::Debug for ChainState<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainState")
            .field("view", &*self.view.borrow())
            .finish_non_exhaustive()
    }
}

impl<P> ChainState<P>
where
    P: Send + Sync + 'static,
{
    /// Start an instance with the default tokio clock.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, H>(storage: S, handler: H, config: ChainStateConfig) -> Result<Self>
    where
        S: ChainStorageEffects + 'static,
        H: ChainStateHandler<P> + 'static,
    {
        ChainStateBuilder::new(storage, handler).config(config).spawn()
    }

    /// Start building an instance.
    pub fn builder<S, H>(storage: S, handler: H) -> ChainStateBuilder<P>
    where
        S: ChainStorageEffects + 'static,
        H: ChainStateHandler<P> + 'static,
    {
        ChainStateBuilder::new(storage, handler)
    }

    /// Submit one operation and wait for its outcome.
    ///
    /// Submissions made before the instance is ready are queued and processed
    /// in order once loading completes.
    pub async fn submit(&self, op: Operation<P>) -> Result<Admission> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit { op, reply }).await?;
        response.await.map_err(|_| ChainStateError::Closed)?
    }

    /// Feed a whole stream through the pipeline, then finish.
    ///
    /// Stops at the first failed operation and returns its error without
    /// finishing the instance. On end of stream the open window is committed
    /// and the final tip returned.
    pub async fn ingest<S>(&self, stream: S) -> Result<Option<Tip>>
    where
        S: Stream<Item = Operation<P>>,
    {
        futures::pin_mut!(stream);
        while let Some(op) = stream.next().await {
            self.submit(op).await?;
        }
        self.finish().await
    }

    /// Commit the open window now. Returns the durable tip.
    pub async fn flush(&self) -> Result<Option<Tip>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Flush { reply }).await?;
        response.await.map_err(|_| ChainStateError::Closed)?
    }

    /// Commit the open window and stop the pipeline.
    ///
    /// Later submissions from any handle fail with `Closed`. Reads keep
    /// returning the final state.
    pub async fn finish(&self) -> Result<Option<Tip>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Finish { reply }).await?;
        response.await.map_err(|_| ChainStateError::Closed)?
    }

    async fn send(&self, command: Command<P>) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChainStateError::Closed)
    }
}

impl<P> ChainState<P> {
    /// Wait until the initial tip is loaded.
    pub async fn wait_ready(&self) -> Result<(Option<Tip>, StartPoint)> {
        let mut view = self.view.clone();
        loop {
            {
                let current = view.borrow_and_update();
                match current.phase {
                    Phase::Ready => {
                        return Ok((current.tip, current.start.clone().unwrap_or_default()))
                    }
                    Phase::Failed => {
                        return Err(current.init_error.clone().unwrap_or(ChainStateError::NotReady))
                    }
                    Phase::Uninitialized | Phase::Loading => {}
                }
            }
            if view.changed().await.is_err() {
                return Err(ChainStateError::Closed);
            }
        }
    }

    /// Whether the initial tip has been loaded.
    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.view.borrow().phase
    }

    /// Latest published view.
    pub fn view(&self) -> ChainStateView {
        self.view.borrow().clone()
    }

    /// In-memory tip. `None` means no record is applied.
    pub fn tip(&self) -> Result<Option<Tip>> {
        self.ready_view(|view| view.tip)
    }

    /// In-memory head. Unlike `tip`, tells a fresh chain apart from one
    /// whose genesis record was retracted.
    pub fn head(&self) -> Result<ChainHead> {
        self.ready_view(|view| view.head)
    }

    /// Height of the in-memory tip.
    pub fn height(&self) -> Result<Option<u64>> {
        Ok(self.tip()?.map(|tip| tip.height))
    }

    /// Hash of the in-memory tip.
    pub fn hash(&self) -> Result<Option<BlockHash>> {
        Ok(self.tip()?.map(|tip| tip.hash))
    }

    /// Persisted start point.
    pub fn start(&self) -> Result<StartPoint> {
        self.ready_view(|view| view.start.clone().unwrap_or_default())
    }

    /// Tip as of the last successful commit.
    pub fn durable_tip(&self) -> Result<Option<Tip>> {
        self.ready_view(|view| view.durable_tip)
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainStateEvent> {
        self.events.subscribe()
    }

    fn ready_view<T>(&self, read: impl FnOnce(&ChainStateView) -> T) -> Result<T> {
        let view = self.view.borrow();
        match view.phase {
            Phase::Ready => Ok(read(&view)),
            _ => Err(ChainStateError::NotReady),
        }
    }
}

/// Builder for `ChainState`.
pub struct ChainStateBuilder<P> {
    storage: Arc<dyn ChainStorageEffects>,
    handler: Arc<dyn ChainStateHandler<P>>,
    config: ChainStateConfig,
    time: Option<Arc<dyn PhysicalTimeEffects>>,
    events: broadcast::Sender<ChainStateEvent>,
}

impl<P> ChainStateBuilder<P>
where
    P: Send + Sync + 'static,
{
    /// Create a builder with default configuration.
    pub fn new<S, H>(storage: S, handler: H) -> Self
    where
        S: ChainStorageEffects + 'static,
        H: ChainStateHandler<P> + 'static,
    {
        let config = ChainStateConfig::default();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            storage: Arc::new(storage),
            handler: Arc::new(handler),
            config,
            time: None,
            events,
        }
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: ChainStateConfig) -> Self {
        if config.event_capacity != self.config.event_capacity && config.event_capacity > 0 {
            // Receivers taken before this point stay on the old channel.
            self.events = broadcast::channel(config.event_capacity).0;
        }
        self.config = config;
        self
    }

    /// Drive commit windows from `time` instead of the tokio clock.
    pub fn time(mut self, time: Arc<dyn PhysicalTimeEffects>) -> Self {
        self.time = Some(time);
        self
    }

    /// Subscribe before spawning, so the `Ready` event cannot be missed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainStateEvent> {
        self.events.subscribe()
    }

    /// Validate the configuration and start the pipeline task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<ChainState<P>> {
        self.config.validate()?;

        let time: Arc<dyn PhysicalTimeEffects> = match self.time {
            Some(time) => time,
            None => Arc::new(TokioTimeHandler::new()),
        };
        let (command_tx, command_rx) = mpsc::channel(self.config.queue_capacity);
        let (deadline_tx, deadline_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ChainStateView::uninitialized());

        let scheduler = CommitScheduler::new(self.config.commit_interval_ms, time, deadline_tx);
        let pipeline = Pipeline::new(
            self.storage,
            self.handler,
            self.config,
            scheduler,
            view_tx,
            self.events.clone(),
        );
        tokio::spawn(pipeline.run(command_rx, deadline_rx));

        Ok(ChainState {
            commands: command_tx,
            view: view_rx,
            events: self.events,
        })
    }
}
