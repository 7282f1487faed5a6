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

//! Per-frame buffering of objects the GPU may still be reading.
//!
//! ```text
//! Epoch N:     [Slot 0: GPU executes]
//! Epoch N+1:   [Slot 1: CPU records]  <- prepare(N + 1)
//! Epoch N+2:   [Slot 0: CPU records]  <- cycle back once epoch N retired
//! ```

/// Holds one `T` per frame in flight and selects the slot for a frame epoch.
///
/// Whatever is stored here (a command recorder, a descriptor table heap) is
/// reused every `len()` frames, so it is never touched while the frame that
/// last used it may still be executing.
#[derive(Debug)]
pub struct FrameBuffered<T> {
    slots: Vec<T>,
    current: usize,
}

impl<T> FrameBuffered<T> {
    /// Creates `count` slots (at least one) with `init(slot_index)`.
    pub fn new(count: usize, init: impl FnMut(usize) -> T) -> Self {
        let slots = (0..count.max(1)).map(init).collect();
        Self { slots, current: 0 }
    }

    /// Selects the slot belonging to `epoch` and returns it.
    pub fn prepare(&mut self, epoch: u64) -> &mut T {
        self.current = (epoch % self.slots.len() as u64) as usize;
        &mut self.slots[self.current]
    }

    /// The slot selected by the last [`prepare`](Self::prepare).
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// The slot selected by the last [`prepare`](Self::prepare), mutably.
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current]
    }

    /// Index of the current slot.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; there is at least one slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over every slot, e.g. to release them all at shutdown.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}

impl<T: Default> FrameBuffered<T> {
    /// Creates `count` default slots.
    pub fn from_default(count: usize) -> Self {
        Self::new(count, |_| T::default())
    }
}
