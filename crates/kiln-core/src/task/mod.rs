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

//! Deferred GPU work: pooled tasks, priority queues and their processing.

pub mod kinds;
mod manager;
mod pool;

pub use self::kinds::*;
pub use self::manager::{PoolStats, TaskManager};
pub use self::pool::{Pooled, TaskPool};

pub(crate) use self::pool::QueuedTask;

use crate::traits::CommandRecorder;
use std::fmt;

/// When a task runs relative to the frame.
///
/// Deferred priorities are drained once per frame by
/// [`TaskManager::process`]; `Immediate` runs inline on the caller's recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GpuPriority {
    /// Drained before the frame's draw work is recorded.
    StartOfFrame,
    /// Run synchronously on the caller's recorder at push time.
    Immediate,
    /// Drained after the frame's draw work is recorded.
    EndOfFrame,
}

impl GpuPriority {
    /// Every priority, in drain order.
    pub const ALL: [GpuPriority; 3] = [
        GpuPriority::StartOfFrame,
        GpuPriority::Immediate,
        GpuPriority::EndOfFrame,
    ];

    pub(crate) fn queue_index(self) -> Option<usize> {
        match self {
            GpuPriority::StartOfFrame => Some(0),
            GpuPriority::Immediate => None,
            GpuPriority::EndOfFrame => Some(1),
        }
    }
}

impl fmt::Display for GpuPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuPriority::StartOfFrame => "StartOfFrame",
            GpuPriority::Immediate => "Immediate",
            GpuPriority::EndOfFrame => "EndOfFrame",
        };
        f.write_str(name)
    }
}

/// A one-shot completion callback, given `true` when the task succeeded.
pub type TaskCallback = Box<dyn FnOnce(bool) + Send>;

/// A unit of GPU work that is acquired from a pool, populated, pushed and
/// recycled after it has run.
///
/// `Default` builds the empty instance a pool hands out; `clear_for_pool`
/// must return a used instance to that state, dropping any resource it holds.
pub trait GpuTask: Default + Send + 'static {
    /// A stable tag identifying the task's pool.
    fn kind() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Admission check run at push time. A task that fails it is dropped
    /// without running and without firing its callback.
    fn validate(&self) -> bool {
        true
    }

    /// Records the task's work. Returns `false` if the work failed.
    fn process(&mut self, recorder: &mut dyn CommandRecorder) -> bool;

    /// Resets the task for reuse.
    fn clear_for_pool(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_display() {
        assert_eq!(GpuPriority::StartOfFrame.to_string(), "StartOfFrame");
        assert_eq!(GpuPriority::EndOfFrame.to_string(), "EndOfFrame");
    }

    #[test]
    fn test_only_deferred_priorities_have_queues() {
        assert_eq!(GpuPriority::StartOfFrame.queue_index(), Some(0));
        assert_eq!(GpuPriority::Immediate.queue_index(), None);
        assert_eq!(GpuPriority::EndOfFrame.queue_index(), Some(1));
        assert!(GpuPriority::StartOfFrame < GpuPriority::Immediate);
        assert!(GpuPriority::Immediate < GpuPriority::EndOfFrame);
    }
}
