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

//! Counters describing the work done by the GPU core.
//!
//! The counters are plain atomics updated with `Ordering::Relaxed`, so any
//! thread may read them through [`GpuStats::snapshot`] without synchronizing
//! with the frame driver.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a [`DeviceContext`](crate::device::DeviceContext).
#[derive(Debug, Default)]
pub struct GpuStats {
    allocated_vram: AtomicU64,
    peak_vram: AtomicU64,
    tasks_pushed: AtomicU64,
    tasks_dropped: AtomicU64,
    tasks_processed: AtomicU64,
    tasks_failed: AtomicU64,
    submits_failed: AtomicU64,
    bind_calls: AtomicU64,
    bind_calls_skipped: AtomicU64,
    pending_releases: AtomicU64,
}

/// A point-in-time copy of [`GpuStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuStatsSnapshot {
    /// Bytes of native memory currently held by realized root resources.
    pub allocated_vram: u64,
    /// The highest value `allocated_vram` has reached.
    pub peak_vram: u64,
    /// Tasks accepted by the task manager.
    pub tasks_pushed: u64,
    /// Tasks rejected by their admission check.
    pub tasks_dropped: u64,
    /// Tasks that ran, successfully or not.
    pub tasks_processed: u64,
    /// Tasks that ran and reported failure.
    pub tasks_failed: u64,
    /// Drained queues whose command list could not be closed or submitted.
    /// The tasks in them have already reported their outcome.
    pub submits_failed: u64,
    /// Batched native bind calls issued by slot groups.
    pub bind_calls: u64,
    /// Slot group diff passes that found nothing to rebind.
    pub bind_calls_skipped: u64,
    /// Native objects waiting in the deferred-release queue.
    pub pending_releases: u64,
}

impl GpuStats {
    /// Creates a set of zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `bytes` of native memory were allocated.
    pub fn allocate_vram(&self, bytes: u64) {
        let now = self.allocated_vram.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_vram.fetch_max(now, Ordering::Relaxed);
    }

    /// Records that `bytes` of native memory were released.
    pub fn deallocate_vram(&self, bytes: u64) {
        let _ = self
            .allocated_vram
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub(crate) fn record_task_pushed(&self) {
        self.tasks_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_task_dropped(&self) {
        self.tasks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_task_processed(&self, success: bool) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_submit_failed(&self) {
        self.submits_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bind(&self, issued: bool) {
        if issued {
            self.bind_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bind_calls_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn set_pending_releases(&self, count: usize) {
        self.pending_releases.store(count as u64, Ordering::Relaxed);
    }

    /// Returns the bytes of native memory currently allocated.
    pub fn allocated_vram(&self) -> u64 {
        self.allocated_vram.load(Ordering::Relaxed)
    }

    /// Takes a snapshot of every counter.
    pub fn snapshot(&self) -> GpuStatsSnapshot {
        GpuStatsSnapshot {
            allocated_vram: self.allocated_vram.load(Ordering::Relaxed),
            peak_vram: self.peak_vram.load(Ordering::Relaxed),
            tasks_pushed: self.tasks_pushed.load(Ordering::Relaxed),
            tasks_dropped: self.tasks_dropped.load(Ordering::Relaxed),
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            submits_failed: self.submits_failed.load(Ordering::Relaxed),
            bind_calls: self.bind_calls.load(Ordering::Relaxed),
            bind_calls_skipped: self.bind_calls_skipped.load(Ordering::Relaxed),
            pending_releases: self.pending_releases.load(Ordering::Relaxed),
        }
    }
}
