use std::sync::Arc;

use flotilla_futures::parallel_transform;
use tokio::sync::oneshot;
use tracing::debug;

pub type ShardId = usize;

const SHARD_QUEUE_CAPACITY: usize = 256;

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("Shard {0} does not exist.")]
    NoSuchShard(ShardId),

    #[error("Shard {0} has shutdown and can no longer handle requests.")]
    DeadShard(ShardId),
}

/// A service replicated across a fixed set of shards.
///
/// Each shard owns its own instance of `S` inside an actor task, no state is
/// shared between shards. All access goes through closures which are executed
/// on the owning shard in the order they were submitted.
///
/// The actors stop once every handle to the service has been dropped.
pub struct Sharded<S> {
    shards: Arc<[ShardHandle<S>]>,
}

impl<S> Clone for Sharded<S> {
    fn clone(&self) -> Self {
        Self {
            shards: self.shards.clone(),
        }
    }
}

impl<S> Sharded<S>
where
    S: Send + 'static,
{
    /// Starts `num_shards` actors, creating the state of each shard with `factory`.
    ///
    /// At least one shard is always started.
    pub fn start(num_shards: usize, mut factory: impl FnMut(ShardId) -> S) -> Self {
        let shards = (0..num_shards.max(1))
            .map(|shard_id| ShardHandle::spawn(shard_id, factory(shard_id)))
            .collect::<Vec<_>>();

        Self {
            shards: shards.into(),
        }
    }

    #[inline]
    /// The number of shards the service is replicated across.
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Runs `func` against the state of the given shard.
    pub async fn invoke_on<F, R>(&self, shard_id: ShardId, func: F) -> Result<R, ShardError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let shard = self
            .shards
            .get(shard_id)
            .ok_or(ShardError::NoSuchShard(shard_id))?;

        shard.invoke(func).await
    }

    /// Runs `func` against the state of every shard in parallel.
    ///
    /// The results are returned in shard order. The call resolves once every
    /// shard has finished, if any shard failed one of the errors is returned.
    pub async fn invoke_on_all<F, R>(&self, func: F) -> Result<Vec<R>, ShardError>
    where
        F: Fn(&mut S) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let func = Arc::new(func);

        parallel_transform(self.shards.iter(), |shard| {
            let func = func.clone();
            shard.invoke(move |state| func(state))
        })
        .await
    }
}

struct ShardHandle<S> {
    shard_id: ShardId,
    tasks_tx: flume::Sender<Task<S>>,
}

impl<S> ShardHandle<S>
where
    S: Send + 'static,
{
    fn spawn(shard_id: ShardId, state: S) -> Self {
        let (tasks_tx, tasks_rx) = flume::bounded(SHARD_QUEUE_CAPACITY);

        tokio::spawn(run_shard(shard_id, state, tasks_rx));

        Self { shard_id, tasks_tx }
    }

    async fn invoke<F, R>(&self, func: F) -> Result<R, ShardError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: Task<S> = Box::new(move |state| {
            let _ = tx.send(func(state));
        });

        self.tasks_tx
            .send_async(task)
            .await
            .map_err(|_| ShardError::DeadShard(self.shard_id))?;

        rx.await.map_err(|_| ShardError::DeadShard(self.shard_id))
    }
}

async fn run_shard<S>(shard_id: ShardId, mut state: S, tasks: flume::Receiver<Task<S>>) {
    debug!(shard_id = shard_id, "Shard is running.");

    while let Ok(task) = tasks.recv_async().await {
        task(&mut state);
    }

    debug!(shard_id = shard_id, "All shard handles dropped, shutting down shard.");
}
