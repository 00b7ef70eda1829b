//! Actor tasks and the pool that spawns and retires them
//!
//! Each actor is one tokio task running think-time/iteration cycles until its
//! stop signal fires. A stop signal cuts a think-time sleep short but never an
//! iteration in flight. Retired actors keep their id until their task has
//! finished, so an id is never driven by two tasks at once.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::scenario::{ActorId, RandomSource, ScenarioDispatcher, ThinkTime};
use crate::stats::MetricsAggregator;

/// State every actor of a run shares
pub struct ActorShared {
    pub dispatcher: ScenarioDispatcher,
    pub aggregator: Arc<MetricsAggregator>,
    pub think_time: ThinkTime,
}

struct ActorHandle {
    id: ActorId,
    stop: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

/// Counts from the teardown drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownStats {
    pub drained: usize,
    pub interrupted: usize,
}

async fn actor_loop(
    actor_id: ActorId,
    shared: Arc<ActorShared>,
    mut rng: RandomSource,
    mut stop: watch::Receiver<bool>,
) -> u64 {
    let mut iteration = 0u64;
    debug!(actor_id = %actor_id, "actor started");

    loop {
        if *stop.borrow() {
            break;
        }

        let pause = shared.think_time.sample(&mut rng);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            // Err means the pool is gone, which also means stop
            _ = stop.changed() => break,
        }

        // Recorded per call: an actor aborted mid-iteration keeps its
        // finished calls counted
        let scenario = shared.dispatcher.select(&mut rng);
        let sink = shared.aggregator.as_ref();
        shared
            .dispatcher
            .run_scenario_into(scenario, actor_id, iteration, &mut rng, sink)
            .await;
        shared.aggregator.record_iteration(scenario.name());
        iteration += 1;
    }

    debug!(actor_id = %actor_id, iterations = iteration, "actor stopped");
    iteration
}

pub struct ActorPool {
    shared: Arc<ActorShared>,
    run_seed: Option<u64>,
    max_actors: usize,
    free_ids: BTreeSet<u64>,
    next_id: u64,
    live: Vec<ActorHandle>,
    retiring: Vec<ActorHandle>,
    spawned: u64,
    peak: usize,
}

impl ActorPool {
    pub fn new(shared: ActorShared, run_seed: Option<u64>, max_actors: u32) -> Self {
        Self {
            shared: Arc::new(shared),
            run_seed,
            max_actors: max_actors as usize,
            free_ids: BTreeSet::new(),
            next_id: ActorId::FIRST.0,
            live: Vec::new(),
            retiring: Vec::new(),
            spawned: 0,
            peak: 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn retiring_count(&self) -> usize {
        self.retiring.len()
    }

    pub fn live_ids(&self) -> Vec<ActorId> {
        self.live.iter().map(|a| a.id).collect()
    }

    /// Highest live actor count seen
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Spawn or retire actors towards `target`.
    ///
    /// Live plus retiring actors never exceed the pool maximum, so a
    /// shortfall caused by slow retirements is made up on a later call.
    pub fn scale_to(&mut self, target: u32) {
        self.reap();
        let target = (target as usize).min(self.max_actors);

        while self.live.len() > target {
            if let Some(actor) = self.live.pop() {
                debug!(actor_id = %actor.id, "retiring actor");
                let _ = actor.stop.send(true);
                self.retiring.push(actor);
            }
        }

        while self.live.len() < target && self.live.len() + self.retiring.len() < self.max_actors {
            self.spawn();
        }

        self.peak = self.peak.max(self.live.len());
        metrics::gauge!("taskload_active_actors").set(self.live.len() as f64);
    }

    fn spawn(&mut self) {
        let id = ActorId(self.free_ids.pop_first().unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        }));
        let rng = match self.run_seed {
            Some(seed) => RandomSource::for_actor(seed, self.spawned),
            None => RandomSource::from_entropy(),
        };
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(actor_loop(id, self.shared.clone(), rng, stop_rx));

        debug!(actor_id = %id, "spawned actor");
        self.spawned += 1;
        self.live.push(ActorHandle { id, stop, task });
    }

    /// Return the ids of finished retirees to the free pool
    fn reap(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .retiring
            .drain(..)
            .partition(|actor| actor.task.is_finished());
        self.retiring = running;
        for actor in finished {
            self.free_ids.insert(actor.id.0);
        }
    }

    /// Stop every actor and wait up to `grace` for in-flight iterations.
    /// Actors still running afterwards are aborted.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownStats {
        for actor in &self.live {
            let _ = actor.stop.send(true);
        }
        let actors: Vec<ActorHandle> = self.live.drain(..).chain(self.retiring.drain(..)).collect();
        let total = actors.len();
        metrics::gauge!("taskload_active_actors").set(0.0);

        let aborts: Vec<(ActorId, AbortHandle)> = actors
            .iter()
            .map(|a| (a.id, a.task.abort_handle()))
            .collect();
        // Senders stay alive until the drain ends so no actor sees a
        // closed channel before its stop value
        let (senders, tasks): (Vec<_>, Vec<_>) =
            actors.into_iter().map(|a| (a.stop, a.task)).unzip();

        let drained = match tokio::time::timeout(grace, join_all(tasks)).await {
            Ok(results) => {
                for result in results.iter().filter_map(|r| r.as_ref().err()) {
                    warn!(error = %result, "actor task failed");
                }
                total
            }
            Err(_) => {
                let mut interrupted = 0;
                for (id, abort) in &aborts {
                    if !abort.is_finished() {
                        warn!(actor_id = %id, "actor interrupted after graceful stop");
                        abort.abort();
                        interrupted += 1;
                    }
                }
                drop(senders);
                info!(interrupted, "graceful stop expired");
                return ShutdownStats {
                    drained: total - interrupted,
                    interrupted,
                };
            }
        };
        drop(senders);

        ShutdownStats {
            drained,
            interrupted: 0,
        }
    }
}
