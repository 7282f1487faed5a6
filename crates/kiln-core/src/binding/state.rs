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

use crate::api::ObjectId;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Anything that can be placed in a [`BindingSlot`](super::BindingSlot).
pub trait Bindable: Send + Sync {
    /// Identity, version and slot back-references of the object.
    fn bind_state(&self) -> &BindState;
}

/// Implemented by slot cells so a disposed object can clear the slots that
/// still reference it.
pub(crate) trait SlotLink: Send + Sync {
    fn clear_binding(&self, object: ObjectId);
}

/// Identity and binding bookkeeping shared by every bindable object.
///
/// The version is bumped whenever the object's native state changes in a way
/// that requires re-binding (a resize, a sampler update). Slots compare both
/// identity and version to decide whether a bind is redundant.
pub struct BindState {
    id: ObjectId,
    version: AtomicU32,
    slots: Mutex<SmallVec<[Weak<dyn SlotLink>; 4]>>,
}

impl BindState {
    /// Creates a state with a fresh identity and version `0`.
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            version: AtomicU32::new(0),
            slots: Mutex::new(SmallVec::new()),
        }
    }

    /// The object's process-unique identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The object's current version.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of slots currently referencing the object.
    pub fn bound_slot_count(&self) -> usize {
        let mut slots = self.slots.lock();
        slots.retain(|slot| slot.strong_count() > 0);
        slots.len()
    }

    pub(crate) fn bump_version(&self) -> u32 {
        self.version.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub(crate) fn attach(&self, slot: &Arc<dyn SlotLink>) {
        let mut slots = self.slots.lock();
        slots.retain(|existing| existing.strong_count() > 0);
        if !slots.iter().any(|existing| ptr_eq(existing, slot)) {
            slots.push(Arc::downgrade(slot));
        }
    }

    pub(crate) fn detach(&self, slot: &Arc<dyn SlotLink>) {
        self.slots
            .lock()
            .retain(|existing| existing.strong_count() > 0 && !ptr_eq(existing, slot));
    }

    /// Clears every slot still referencing the object.
    pub(crate) fn unbind_all(&self) {
        // Taken out first: clearing a slot locks the slot, never this list.
        let slots = std::mem::take(&mut *self.slots.lock());
        for slot in slots.iter().filter_map(Weak::upgrade) {
            slot.clear_binding(self.id);
        }
    }
}

impl Default for BindState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindState")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

fn ptr_eq(weak: &Weak<dyn SlotLink>, strong: &Arc<dyn SlotLink>) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(strong))
}
