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

use super::{GpuTask, TaskCallback};
use crate::traits::CommandRecorder;
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An unbounded free list of task instances of one type.
pub struct TaskPool<T> {
    free: Mutex<Vec<T>>,
    created: AtomicUsize,
}

impl<T: GpuTask> TaskPool<T> {
    pub(crate) fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    pub(crate) fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let recycled = self.free.lock().pop();
        let task = recycled.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            T::default()
        });
        Pooled {
            task,
            pool: Some(self.clone()),
            on_completed: None,
        }
    }

    fn recycle(&self, task: T) {
        self.free.lock().push(task);
    }

    /// Instances waiting to be reused.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Instances this pool has ever constructed.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// A task on loan from its pool, together with its completion callback.
///
/// Dropping it returns the task to the pool whether or not it ran; a callback
/// that has not fired by then is discarded.
pub struct Pooled<T: GpuTask> {
    task: T,
    pool: Option<Arc<TaskPool<T>>>,
    on_completed: Option<TaskCallback>,
}

impl<T: GpuTask> Pooled<T> {
    /// Wraps a task that belongs to no pool.
    pub fn unpooled(task: T) -> Self {
        Self {
            task,
            pool: None,
            on_completed: None,
        }
    }

    /// Sets the callback fired once the task has run.
    pub fn on_completed(&mut self, callback: impl FnOnce(bool) + Send + 'static) -> &mut Self {
        self.on_completed = Some(Box::new(callback));
        self
    }

    pub(crate) fn set_callback(&mut self, callback: Option<TaskCallback>) {
        self.on_completed = callback;
    }

    /// Returns `true` if the task will go back to a pool when dropped.
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Runs the task, then fires and clears its callback.
    pub(crate) fn execute(mut self, recorder: &mut dyn CommandRecorder) -> bool {
        let success = self.task.process(recorder);
        if let Some(callback) = self.on_completed.take() {
            callback(success);
        }
        success
    }
}

impl<T: GpuTask> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.task
    }
}

impl<T: GpuTask> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.task
    }
}

impl<T: GpuTask> Drop for Pooled<T> {
    fn drop(&mut self) {
        self.on_completed = None;
        self.task.clear_for_pool();
        if let Some(pool) = self.pool.take() {
            pool.recycle(std::mem::take(&mut self.task));
        }
    }
}

impl<T: GpuTask> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("kind", &T::kind())
            .field("pooled", &self.pool.is_some())
            .field("has_callback", &self.on_completed.is_some())
            .finish()
    }
}

/// A queued task with its type erased.
pub(crate) trait QueuedTask: Send {
    fn kind(&self) -> &'static str;

    fn run(self: Box<Self>, recorder: &mut dyn CommandRecorder) -> bool;
}

impl<T: GpuTask> QueuedTask for Pooled<T> {
    fn kind(&self) -> &'static str {
        T::kind()
    }

    fn run(self: Box<Self>, recorder: &mut dyn CommandRecorder) -> bool {
        (*self).execute(recorder)
    }
}
