// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::kinds::{ComputeTask, DispatchBindings};
use super::{GpuPriority, GpuTask, Pooled, QueuedTask, TaskCallback, TaskPool};
use crate::api::ComputeShaderId;
use crate::device::DeviceShared;
use crate::error::TaskError;
use crate::frame::FrameBuffered;
use crate::traits::CommandRecorder;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Counters of one task pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// The pool's kind tag.
    pub kind: &'static str,
    /// Instances ever constructed.
    pub created: usize,
    /// Instances waiting to be reused.
    pub available: usize,
}

trait ErasedPool: Send + Sync {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn stats(&self, kind: &'static str) -> PoolStats;
}

impl<T: GpuTask> ErasedPool for TaskPool<T> {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn stats(&self, kind: &'static str) -> PoolStats {
        PoolStats {
            kind,
            created: self.created(),
            available: self.available(),
        }
    }
}

struct TaskQueue {
    priority: GpuPriority,
    sender: Sender<Box<dyn QueuedTask>>,
    receiver: Receiver<Box<dyn QueuedTask>>,
    recorders: Mutex<FrameBuffered<Option<Box<dyn CommandRecorder>>>>,
}

impl TaskQueue {
    fn new(priority: GpuPriority, frames_in_flight: usize) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            priority,
            sender,
            receiver,
            recorders: Mutex::new(FrameBuffered::new(frames_in_flight, |_| None)),
        }
    }
}

/// Owns the task pools and the deferred priority queues.
///
/// Producers on any thread [`push`](Self::push) tasks; the frame driver calls
/// [`process`](Self::process) once per frame for each deferred priority. Each
/// deferred queue records onto its own recorder, one per frame in flight.
pub struct TaskManager {
    device: Arc<DeviceShared>,
    queues: [TaskQueue; 2],
    pools: Mutex<FxHashMap<&'static str, Arc<dyn ErasedPool>>>,
}

impl TaskManager {
    pub(crate) fn new(device: Arc<DeviceShared>) -> Self {
        let frames = device.settings().frames_in_flight;
        Self {
            queues: [
                TaskQueue::new(GpuPriority::StartOfFrame, frames),
                TaskQueue::new(GpuPriority::EndOfFrame, frames),
            ],
            pools: Mutex::new(FxHashMap::default()),
            device,
        }
    }

    fn queue(&self, priority: GpuPriority) -> Option<&TaskQueue> {
        priority.queue_index().map(|index| &self.queues[index])
    }

    /// Acquires a task of type `T` from its pool, creating the pool on first use.
    ///
    /// If another task type already registered `T::kind()`, the conflict is
    /// logged and an unpooled instance is returned.
    pub fn get<T: GpuTask>(&self) -> Pooled<T> {
        let kind = T::kind();
        let pool = {
            let mut pools = self.pools.lock();
            let pool = pools.entry(kind).or_insert_with(|| {
                log::debug!("Created task pool '{kind}'.");
                let pool: Arc<dyn ErasedPool> = Arc::new(TaskPool::<T>::new());
                pool
            });
            pool.clone()
        };

        match pool.as_any().downcast::<TaskPool<T>>() {
            Ok(pool) => pool.acquire(),
            Err(_) => {
                log::error!(
                    "Task pool '{kind}' is registered for another task type; returning an unpooled task."
                );
                Pooled::unpooled(T::default())
            }
        }
    }

    /// Pushes a task at `priority`.
    ///
    /// A task whose [`validate`](GpuTask::validate) fails is dropped: it is
    /// never processed and its callback never fires.
    ///
    /// ## Arguments
    /// * `priority` - When the task runs.
    /// * `task` - A task acquired through [`get`](Self::get).
    /// * `recorder` - The active recorder. Required for `Immediate`, ignored otherwise.
    ///
    /// ## Errors
    /// * `TaskError::MissingRecorder` - If an `Immediate` task has no recorder to run on.
    pub fn push<T: GpuTask>(
        &self,
        priority: GpuPriority,
        task: Pooled<T>,
        recorder: Option<&mut dyn CommandRecorder>,
    ) -> Result<(), TaskError> {
        let stats = self.device.stats();

        let Some(queue) = self.queue(priority) else {
            let recorder = recorder.ok_or(TaskError::MissingRecorder { kind: T::kind() })?;
            if !task.validate() {
                log::trace!("Dropped task '{}' at admission.", T::kind());
                stats.record_task_dropped();
                return Ok(());
            }
            stats.record_task_pushed();
            let success = task.execute(recorder);
            stats.record_task_processed(success);
            return Ok(());
        };

        if !task.validate() {
            log::trace!("Dropped task '{}' at admission.", T::kind());
            stats.record_task_dropped();
            return Ok(());
        }

        stats.record_task_pushed();
        if let Err(e) = queue.sender.send(Box::new(task)) {
            log::error!(
                "Failed to enqueue task '{}' at {}: {}",
                e.0.kind(),
                priority,
                e
            );
        }
        Ok(())
    }

    /// Pushes a compute dispatch over `groups` thread groups.
    ///
    /// When `validate_dispatch_limits` is set, the group counts are checked
    /// against the device limits as the task runs. `bindings` are applied and,
    /// on table-binding devices, copied into the frame's descriptor tables
    /// right before the dispatch is recorded.
    pub fn dispatch(
        &self,
        priority: GpuPriority,
        shader: ComputeShaderId,
        groups: [u32; 3],
        bindings: Option<DispatchBindings>,
        recorder: Option<&mut dyn CommandRecorder>,
        on_completed: Option<TaskCallback>,
    ) -> Result<(), TaskError> {
        let mut task = self.get::<ComputeTask>();
        task.shader = Some(shader);
        task.groups = groups;
        task.limits = self
            .device
            .settings()
            .validate_dispatch_limits
            .then(|| self.device.backend().limits());
        task.bindings = bindings;
        task.device = Some(self.device.clone());
        task.set_callback(on_completed);
        self.push(priority, task, recorder)
    }

    /// Drains every task queued at `priority` and submits the recorded work.
    ///
    /// Tasks run in push order inside a debug scope named
    /// `Process '<priority>' tasks`. Tasks pushed while the drain is running
    /// wait for the next call. An empty queue, or `Immediate`, records nothing.
    ///
    /// Each task's completion callback fires as soon as its commands are
    /// recorded, before the command list is closed and submitted. A failed
    /// submission therefore cannot revoke outcomes already reported; it is
    /// logged, counted in [`GpuStats`](crate::stats::GpuStats) and returned.
    ///
    /// ## Returns
    /// The number of tasks that ran.
    ///
    /// ## Errors
    /// * `TaskError::Backend` - If the recorder could not be created, opened, closed or submitted.
    pub fn process(&self, priority: GpuPriority) -> Result<usize, TaskError> {
        let Some(queue) = self.queue(priority) else {
            return Ok(0);
        };
        let pending = queue.receiver.len();
        if pending == 0 {
            return Ok(0);
        }

        let epoch = self.device.frame_epoch();
        let backend = self.device.backend();
        let stats = self.device.stats();

        let mut recorders = queue.recorders.lock();
        let slot = recorders.prepare(epoch);
        let recorder = match slot.take() {
            Some(recorder) => recorder,
            None => backend.create_command_recorder(&format!("{} tasks", queue.priority))?,
        };
        let recorder = slot.insert(recorder);

        recorder.begin()?;
        recorder.begin_event(&format!("Process '{}' tasks", queue.priority));
        let mut processed = 0;
        let mut failed = 0;
        for task in queue.receiver.try_iter().take(pending) {
            let kind = task.kind();
            let success = task.run(recorder.as_mut());
            stats.record_task_processed(success);
            processed += 1;
            if !success {
                failed += 1;
                log::trace!("Task '{kind}' reported failure.");
            }
        }
        recorder.end_event();
        let submitted = recorder
            .end()
            .and_then(|()| backend.submit(recorder.as_mut(), epoch));
        if let Err(err) = submitted {
            stats.record_submit_failed();
            log::error!(
                "Failed to submit {} '{}' task(s) for epoch {}, their callbacks already ran: {}",
                processed,
                priority,
                epoch,
                err
            );
            return Err(err.into());
        }

        log::debug!(
            "Processed {} '{}' task(s) for epoch {} ({} failed).",
            processed,
            priority,
            epoch,
            failed
        );
        Ok(processed)
    }

    /// Tasks waiting in the queue for `priority`. Always `0` for `Immediate`.
    pub fn pending(&self, priority: GpuPriority) -> usize {
        self.queue(priority)
            .map_or(0, |queue| queue.receiver.len())
    }

    /// Counters of every pool created so far, sorted by kind.
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self
            .pools
            .lock()
            .iter()
            .map(|(kind, pool)| pool.stats(*kind))
            .collect();
        stats.sort_by_key(|entry| entry.kind);
        stats
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("start_of_frame", &self.pending(GpuPriority::StartOfFrame))
            .field("end_of_frame", &self.pending(GpuPriority::EndOfFrame))
            .field("pools", &self.pools.lock().len())
            .finish()
    }
}
