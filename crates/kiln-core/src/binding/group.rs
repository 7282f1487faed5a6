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

use super::slot::BindingSlot;
use super::state::Bindable;
use std::fmt;
use std::sync::Arc;

/// The batched backend call a [`SlotGroup`] issues for its changed range.
pub trait GroupBinder<T: ?Sized> {
    /// Binds `values` to the consecutive slots starting at `first`.
    fn bind_range(&mut self, first: u32, values: &[Option<Arc<T>>]);
}

impl<T: ?Sized, F: FnMut(u32, &[Option<Arc<T>>])> GroupBinder<T> for F {
    fn bind_range(&mut self, first: u32, values: &[Option<Arc<T>>]) {
        self(first, values)
    }
}

/// A fixed array of [`BindingSlot`]s bound with a single call.
///
/// After [`update`](Self::update), `first_changed` and `num_changed` describe
/// the smallest contiguous range covering every slot whose binding changed.
/// Unchanged slots inside that range are re-sent with their current value.
pub struct SlotGroup<T: ?Sized + Bindable + 'static> {
    slots: Vec<BindingSlot<T>>,
    first_changed: u32,
    num_changed: u32,
    scratch: Vec<Option<Arc<T>>>,
}

impl<T: ?Sized + Bindable + 'static> SlotGroup<T> {
    /// Creates `count` empty slots with indices `0..count`.
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count as u32).map(BindingSlot::new).collect(),
            first_changed: 0,
            num_changed: 0,
            scratch: Vec::with_capacity(count),
        }
    }

    /// The number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` for a group without slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stages `value` for slot `index`. Out-of-range indices are ignored with
    /// a warning.
    pub fn set(&mut self, index: usize, value: Option<&Arc<T>>) {
        match self.slots.get_mut(index) {
            Some(slot) => slot.set(value),
            None => log::warn!(
                "SlotGroup: Index {} is out of range ({} slots)",
                index,
                self.slots.len()
            ),
        }
    }

    /// The staged object of slot `index`.
    pub fn value(&self, index: usize) -> Option<Arc<T>> {
        self.slots.get(index).and_then(BindingSlot::value)
    }

    /// Stages `None` in every slot.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.set(None);
        }
    }

    /// Index of the first slot changed by the last [`update`](Self::update).
    pub fn first_changed(&self) -> u32 {
        self.first_changed
    }

    /// Length of the changed range computed by the last [`update`](Self::update).
    pub fn num_changed(&self) -> u32 {
        self.num_changed
    }

    /// Diffs every slot against what was last bound and computes the changed
    /// range.
    ///
    /// ## Returns
    /// `true` if at least one slot changed.
    pub fn update(&mut self) -> bool {
        let mut range: Option<(usize, usize)> = None;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.refresh() {
                range = Some(match range {
                    Some((first, _)) => (first, index),
                    None => (index, index),
                });
            }
        }

        match range {
            Some((first, last)) => {
                self.first_changed = first as u32;
                self.num_changed = (last - first + 1) as u32;
                true
            }
            None => {
                self.first_changed = 0;
                self.num_changed = 0;
                false
            }
        }
    }

    /// Runs [`update`](Self::update) and issues one `binder` call covering the
    /// changed range.
    ///
    /// ## Returns
    /// `true` if the backend was called.
    pub fn bind(&mut self, binder: &mut dyn GroupBinder<T>) -> bool {
        if !self.update() {
            return false;
        }
        let first = self.first_changed as usize;
        let last = first + self.num_changed as usize;
        self.scratch
            .extend(self.slots[first..last].iter().map(BindingSlot::bound));
        binder.bind_range(self.first_changed, &self.scratch);
        self.scratch.clear();
        true
    }
}

impl<T: ?Sized + Bindable + 'static> fmt::Debug for SlotGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotGroup")
            .field("len", &self.slots.len())
            .field("first_changed", &self.first_changed)
            .field("num_changed", &self.num_changed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindState;

    struct Dummy {
        state: BindState,
    }

    impl Bindable for Dummy {
        fn bind_state(&self) -> &BindState {
            &self.state
        }
    }

    fn objects(count: usize) -> Vec<Arc<Dummy>> {
        (0..count)
            .map(|_| {
                Arc::new(Dummy {
                    state: BindState::new(),
                })
            })
            .collect()
    }

    #[test]
    fn test_changed_range_covers_all_changes() {
        let objects = objects(3);
        let mut group = SlotGroup::new(8);
        let mut calls = Vec::new();
        let mut binder = |first: u32, values: &[Option<Arc<Dummy>>]| {
            calls.push((first, values.iter().map(Option::is_some).collect::<Vec<_>>()))
        };

        group.set(1, Some(&objects[0]));
        group.set(4, Some(&objects[1]));
        assert!(group.bind(&mut binder));
        assert_eq!(group.first_changed(), 1);
        assert_eq!(group.num_changed(), 4);

        group.set(6, Some(&objects[2]));
        assert!(group.bind(&mut binder));
        assert_eq!(group.first_changed(), 6);
        assert_eq!(group.num_changed(), 1);

        assert!(!group.bind(&mut binder));
        assert_eq!(group.num_changed(), 0);

        assert_eq!(
            calls,
            vec![(1, vec![true, false, false, true]), (6, vec![true])]
        );
    }

    #[test]
    fn test_range_stays_in_bounds() {
        let objects = objects(4);
        // A cheap deterministic sweep over set/clear patterns.
        for pattern in 0u32..256 {
            let mut group = SlotGroup::new(8);
            for index in 0..8 {
                if pattern & (1 << index) != 0 {
                    group.set(index, Some(&objects[index % objects.len()]));
                }
            }
            let changed = group.update();
            let first = group.first_changed();
            let count = group.num_changed();
            assert!(first + count <= 8);
            assert_eq!(changed, count > 0);
            assert_eq!(pattern == 0, count == 0);
            if pattern != 0 {
                assert_eq!(first, pattern.trailing_zeros());
                assert_eq!(first + count, 32 - pattern.leading_zeros());
            }
            assert!(!group.update());
        }
    }

    #[test]
    fn test_disposed_object_leaves_the_group() {
        let objects = objects(2);
        let mut group = SlotGroup::new(2);
        let mut binder = |_: u32, _: &[Option<Arc<Dummy>>]| {};
        group.set(0, Some(&objects[0]));
        group.set(1, Some(&objects[1]));
        group.bind(&mut binder);

        objects[1].bind_state().unbind_all();
        assert!(group.value(1).is_none());
        assert!(group.update());
        assert_eq!((group.first_changed(), group.num_changed()), (1, 1));
    }

    #[test]
    fn test_out_of_range_set_is_ignored() {
        crate::test_support::init_logging();
        let objects = objects(1);
        let mut group = SlotGroup::<Dummy>::new(2);
        group.set(5, Some(&objects[0]));
        assert!(!group.update());
    }
}
