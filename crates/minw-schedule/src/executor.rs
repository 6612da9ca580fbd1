//! Task-graph re-execution
//!
//! Runs every rolled-back vertex on the worker pool as soon as all of its
//! producers have finished. Successor tasks are submitted from inside
//! worker tasks; a saturated queue is retried after yielding.

use crate::error::{ScheduleError, ScheduleResult};
use crate::timeline::Schedule;
use minw_pool::{PoolError, TaskPool};
use minw_types::{StorageAdapter, TxArena, VertexId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct VertexTask {
    reads: Vec<String>,
    writes: Vec<String>,
    dependents: Vec<VertexId>,
}

struct ExecState {
    storage: Arc<dyn StorageAdapter>,
    tasks: HashMap<VertexId, VertexTask>,
    pending: HashMap<VertexId, AtomicUsize>,
    remaining: AtomicUsize,
    failure: Mutex<Option<ScheduleError>>,
    done_lock: Mutex<bool>,
    done: Condvar,
}

/// Re-execute every vertex in `schedule` through `pool`, honoring the
/// dependency graph. Reads and writes are replayed against `storage`.
pub fn re_execute(
    arena: &TxArena,
    schedule: &Schedule,
    pool: &Arc<TaskPool>,
    storage: Arc<dyn StorageAdapter>,
) -> ScheduleResult<()> {
    validate(arena, schedule)?;
    if schedule.order.is_empty() {
        return Ok(());
    }

    let tasks = schedule
        .order
        .iter()
        .map(|&vid| {
            let v = arena.vertex(vid);
            let task = VertexTask {
                reads: v.read_set.iter().cloned().collect(),
                writes: v.write_set.iter().cloned().collect(),
                dependents: schedule
                    .dependency_graph
                    .get(&vid)
                    .cloned()
                    .unwrap_or_default(),
            };
            (vid, task)
        })
        .collect();
    let pending = schedule
        .order
        .iter()
        .map(|&vid| (vid, AtomicUsize::new(schedule.pred_counts[&vid])))
        .collect();

    let state = Arc::new(ExecState {
        storage,
        tasks,
        pending,
        remaining: AtomicUsize::new(schedule.order.len()),
        failure: Mutex::new(None),
        done_lock: Mutex::new(false),
        done: Condvar::new(),
    });

    let roots: Vec<VertexId> = schedule
        .order
        .iter()
        .copied()
        .filter(|vid| schedule.pred_counts[vid] == 0)
        .collect();
    debug!(total = schedule.order.len(), roots = roots.len(), "re-execution started");
    for vid in roots {
        spawn_vertex(&state, pool, vid);
    }

    let mut finished = state.done_lock.lock();
    while !*finished {
        state.done.wait(&mut finished);
    }
    drop(finished);

    let failure = state.failure.lock().take();
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Every dependency edge must point from an earlier slot to a later one
fn validate(arena: &TxArena, schedule: &Schedule) -> ScheduleResult<()> {
    for (&producer, dependents) in &schedule.dependency_graph {
        let finish = schedule.times[&producer] + arena.vertex(producer).self_cost;
        for dep in dependents {
            if schedule.times[dep] < finish {
                return Err(ScheduleError::OrderViolation {
                    vertex: arena.vertex(*dep).id.clone(),
                    target: schedule.times[dep],
                });
            }
        }
    }
    Ok(())
}

fn spawn_vertex(state: &Arc<ExecState>, pool: &Arc<TaskPool>, vid: VertexId) {
    let task_state = Arc::clone(state);
    let task_pool = Arc::clone(pool);
    loop {
        let st = Arc::clone(&task_state);
        let pl = Arc::clone(&task_pool);
        match pool.submit(move || run_vertex(&st, &pl, vid)) {
            Ok(_) => return,
            Err(PoolError::Saturated { capacity }) => {
                warn!(capacity, vertex = %vid, "queue saturated, retrying");
                std::thread::yield_now();
            }
            Err(err) => {
                record_failure(state, err.into());
                finish_one(state);
                return;
            }
        }
    }
}

fn run_vertex(state: &Arc<ExecState>, pool: &Arc<TaskPool>, vid: VertexId) {
    let task = &state.tasks[&vid];
    let reads: Vec<&str> = task.reads.iter().map(String::as_str).collect();
    let writes: Vec<&str> = task.writes.iter().map(String::as_str).collect();
    state.storage.on_read(&reads);
    state.storage.on_write(&writes);

    for &dep in &task.dependents {
        if state.pending[&dep].fetch_sub(1, Ordering::AcqRel) == 1 {
            spawn_vertex(state, pool, dep);
        }
    }
    finish_one(state);
}

fn record_failure(state: &Arc<ExecState>, err: ScheduleError) {
    let mut failure = state.failure.lock();
    if failure.is_none() {
        *failure = Some(err);
    }
}

fn finish_one(state: &Arc<ExecState>) {
    if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        let mut finished = state.done_lock.lock();
        *finished = true;
        state.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimeSpaceGraph;
    use minw_types::{NoopStorage, TxNode};

    struct RecordingStorage {
        log: Mutex<Vec<(char, String)>>,
    }

    impl StorageAdapter for RecordingStorage {
        fn on_read(&self, keys: &[&str]) {
            let mut log = self.log.lock();
            for k in keys {
                log.push(('r', k.to_string()));
            }
        }
        fn on_write(&self, keys: &[&str]) {
            let mut log = self.log.lock();
            for k in keys {
                log.push(('w', k.to_string()));
            }
        }
    }

    fn build_schedule(txs: Vec<TxNode>) -> (TxArena, Schedule) {
        let mut arena = TxArena::new();
        for tx in &txs {
            arena.add_transaction(tx).unwrap();
        }
        let list: Vec<VertexId> = arena.hypers().iter().map(|h| h.root).collect();
        let schedule = TimeSpaceGraph::new(&arena, list).finish();
        (arena, schedule)
    }

    #[test]
    fn test_re_execute_runs_everything() {
        let (arena, schedule) = build_schedule(vec![
            TxNode::new(2).write("k"),
            TxNode::new(2).read("k").write("j"),
            TxNode::new(2).read("j"),
        ]);
        let pool = Arc::new(TaskPool::new(2));
        let storage = Arc::new(RecordingStorage {
            log: Mutex::new(Vec::new()),
        });

        re_execute(&arena, &schedule, &pool, storage.clone()).unwrap();

        let log = storage.log.lock();
        // 2 reads + 2 writes across the three transactions
        assert_eq!(log.len(), 4);
        let pos = |ev: (char, &str)| {
            log.iter()
                .position(|(c, k)| *c == ev.0 && k == ev.1)
                .unwrap()
        };
        // writer of k precedes its reader, writer of j precedes its reader
        assert!(pos(('w', "k")) < pos(('r', "k")));
        assert!(pos(('w', "j")) < pos(('r', "j")));
    }

    #[test]
    fn test_re_execute_empty_schedule() {
        let arena = TxArena::new();
        let schedule = Schedule::default();
        let pool = Arc::new(TaskPool::new(1));
        re_execute(&arena, &schedule, &pool, Arc::new(NoopStorage)).unwrap();
    }

    #[test]
    fn test_order_violation_is_rejected() {
        let (arena, mut schedule) = build_schedule(vec![
            TxNode::new(5).write("k"),
            TxNode::new(5).read("k"),
        ]);
        // corrupt the reader's slot so it overlaps its producer
        let reader = schedule.order[1];
        schedule.times.insert(reader, 0);

        let pool = Arc::new(TaskPool::new(1));
        let err = re_execute(&arena, &schedule, &pool, Arc::new(NoopStorage)).unwrap_err();
        assert!(matches!(err, ScheduleError::OrderViolation { .. }));
    }

    #[test]
    fn test_independent_txs_all_complete() {
        let (arena, schedule) = build_schedule(
            (0..32)
                .map(|i| TxNode::new(1).write(&format!("k{i}")))
                .collect(),
        );
        let pool = Arc::new(TaskPool::new(4));
        let storage = Arc::new(RecordingStorage {
            log: Mutex::new(Vec::new()),
        });
        re_execute(&arena, &schedule, &pool, storage.clone()).unwrap();
        assert_eq!(storage.log.lock().len(), 32);
    }
}
