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

//! Deferred release of native objects, keyed by frame epoch.

use crate::api::NativeHandle;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A native object waiting for the GPU to retire the epoch it was disposed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingRelease {
    /// The frame epoch during which the owner was disposed.
    pub epoch: u64,
    pub handle: NativeHandle,
    /// Bytes accounted against VRAM for this object.
    pub bytes: u64,
    pub label: String,
}

/// FIFO of pending releases. Epochs only grow, so the queue stays sorted and
/// draining stops at the first entry that is still too young.
#[derive(Debug, Default)]
pub(crate) struct ReleaseQueue {
    pending: Mutex<VecDeque<PendingRelease>>,
}

impl ReleaseQueue {
    pub fn push(&self, entry: PendingRelease) {
        self.pending.lock().push_back(entry);
    }

    /// Removes every entry whose epoch is at or before `completed_epoch`.
    pub fn drain_completed(&self, completed_epoch: u64) -> Vec<PendingRelease> {
        let mut pending = self.pending.lock();
        let ready = pending
            .iter()
            .take_while(|entry| entry.epoch <= completed_epoch)
            .count();
        pending.drain(..ready).collect()
    }

    /// Removes every entry regardless of its epoch.
    pub fn drain_all(&self) -> Vec<PendingRelease> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
