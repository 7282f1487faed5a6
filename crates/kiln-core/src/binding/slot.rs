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

use super::state::{Bindable, SlotLink};
use crate::api::ObjectId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// The backend call a single slot issues when its binding changes.
pub trait SlotBinder<T: ?Sized> {
    /// Binds `value` at `index`, or unbinds the slot if `value` is `None`.
    fn bind_slot(&mut self, index: u32, value: Option<&T>);
}

impl<T: ?Sized, F: FnMut(u32, Option<&T>)> SlotBinder<T> for F {
    fn bind_slot(&mut self, index: u32, value: Option<&T>) {
        self(index, value)
    }
}

struct Bound<T: ?Sized> {
    object: Weak<T>,
    id: ObjectId,
    version: u32,
}

struct SlotInner<T: ?Sized> {
    /// What the caller wants bound.
    value: Option<Weak<T>>,
    /// What the backend last saw.
    bound: Option<Bound<T>>,
}

pub(crate) struct SlotCell<T: ?Sized> {
    inner: Mutex<SlotInner<T>>,
}

impl<T: ?Sized + Bindable> SlotLink for SlotCell<T> {
    fn clear_binding(&self, object: ObjectId) {
        let mut inner = self.inner.lock();
        let staged_is_object = match inner.value.as_ref().map(Weak::upgrade) {
            Some(Some(value)) => value.bind_state().id() == object,
            // The object is being dropped.
            Some(None) => true,
            None => false,
        };
        if staged_is_object {
            inner.value = None;
        }
    }
}

/// One binding point with change tracking.
///
/// The slot holds only a weak reference to its object; the object holds a
/// back-reference to the slot so disposing it clears the slot. A bind is
/// skipped when the object's identity and version match what the backend last
/// saw.
pub struct BindingSlot<T: ?Sized + Bindable + 'static> {
    index: u32,
    cell: Arc<SlotCell<T>>,
}

impl<T: ?Sized + Bindable + 'static> BindingSlot<T> {
    /// Creates an empty slot for binding point `index`.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            cell: Arc::new(SlotCell {
                inner: Mutex::new(SlotInner {
                    value: None,
                    bound: None,
                }),
            }),
        }
    }

    /// The binding point this slot drives.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Stages `value` without talking to the backend.
    pub fn set(&mut self, value: Option<&Arc<T>>) {
        self.cell.inner.lock().value = value.map(Arc::downgrade);
    }

    /// The staged object, if it is still alive.
    pub fn value(&self) -> Option<Arc<T>> {
        self.cell.inner.lock().value.as_ref().and_then(Weak::upgrade)
    }

    /// The object the backend last saw bound, if it is still alive.
    pub fn bound(&self) -> Option<Arc<T>> {
        self.cell
            .inner
            .lock()
            .bound
            .as_ref()
            .and_then(|bound| bound.object.upgrade())
    }

    /// Stages `value` and commits it. See [`commit`](Self::commit).
    pub fn bind(&mut self, value: Option<&Arc<T>>, binder: &mut dyn SlotBinder<T>) -> bool {
        self.set(value);
        self.commit(binder)
    }

    /// Calls `binder` if the staged object differs from the bound one by
    /// identity or version.
    ///
    /// ## Returns
    /// `true` if the backend was called.
    pub fn commit(&mut self, binder: &mut dyn SlotBinder<T>) -> bool {
        if !self.refresh() {
            return false;
        }
        let bound = self.bound();
        binder.bind_slot(self.index, bound.as_deref());
        true
    }

    /// Records the staged object as bound if it changed.
    pub(crate) fn refresh(&mut self) -> bool {
        let (previous, current) = {
            let mut inner = self.cell.inner.lock();
            let staged = inner.value.as_ref().and_then(Weak::upgrade);
            let key = staged
                .as_ref()
                .map(|value| (value.bind_state().id(), value.bind_state().version()));
            let bound_key = inner.bound.as_ref().map(|bound| (bound.id, bound.version));
            if key == bound_key {
                return false;
            }

            let previous = inner.bound.take().and_then(|bound| bound.object.upgrade());
            inner.bound = staged.as_ref().zip(key).map(|(value, (id, version))| Bound {
                object: Arc::downgrade(value),
                id,
                version,
            });
            (previous, staged)
        };

        // Back-references are updated with the slot unlocked.
        let link: Arc<dyn SlotLink> = self.cell.clone();
        if let Some(previous) = &previous {
            let same = current
                .as_ref()
                .is_some_and(|value| value.bind_state().id() == previous.bind_state().id());
            if !same {
                previous.bind_state().detach(&link);
            }
        }
        if let Some(current) = &current {
            current.bind_state().attach(&link);
        }
        true
    }
}

impl<T: ?Sized + Bindable + 'static> fmt::Debug for BindingSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.cell.inner.lock();
        f.debug_struct("BindingSlot")
            .field("index", &self.index)
            .field("bound", &inner.bound.as_ref().map(|bound| (bound.id, bound.version)))
            .finish()
    }
}
