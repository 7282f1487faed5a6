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

use super::handle::DescriptorHandle;
use crate::api::{DescriptorHeapId, DescriptorHeapKind, NativeDescriptorHeap};
use std::ops::Range;

/// One native descriptor heap and its free ranges.
///
/// Freed ranges are appended as-is; adjacent ranges are only merged by
/// [`defragment`](Self::defragment).
#[derive(Debug)]
pub struct DescriptorHeap {
    native: NativeDescriptorHeap,
    kind: DescriptorHeapKind,
    capacity: u32,
    free: Vec<Range<u32>>,
}

impl DescriptorHeap {
    /// Wraps a freshly created native heap of `capacity` descriptors.
    pub fn new(native: NativeDescriptorHeap, kind: DescriptorHeapKind, capacity: u32) -> Self {
        Self {
            native,
            kind,
            capacity,
            free: vec![0..capacity],
        }
    }

    /// The native heap.
    pub fn id(&self) -> DescriptorHeapId {
        self.native.id
    }

    /// The kind of descriptors the heap holds.
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// Total descriptors in the heap.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Descriptors not currently allocated.
    pub fn available(&self) -> u32 {
        self.free.iter().map(|range| range.end - range.start).sum()
    }

    /// Number of separate free ranges.
    pub fn fragment_count(&self) -> usize {
        self.free.len()
    }

    /// Returns `true` if the heap is visible to shaders.
    pub fn is_gpu_visible(&self) -> bool {
        self.native.gpu_start.is_some()
    }

    /// Allocates `count` consecutive descriptors from the first free range
    /// large enough to hold them.
    pub fn allocate(&mut self, count: u32) -> Option<DescriptorHandle> {
        if count == 0 {
            return None;
        }
        let index = self
            .free
            .iter()
            .position(|range| range.end - range.start >= count)?;
        Some(self.take(index, count))
    }

    /// Allocates up to `count` descriptors from the first free range.
    ///
    /// Used by allocators that may chain several ranges into one handle.
    pub fn allocate_partial(&mut self, count: u32) -> Option<DescriptorHandle> {
        if count == 0 || self.free.is_empty() {
            return None;
        }
        let taken = count.min(self.free[0].end - self.free[0].start);
        Some(self.take(0, taken))
    }

    fn take(&mut self, index: usize, count: u32) -> DescriptorHandle {
        let start = self.free[index].start;
        self.free[index].start += count;
        if self.free[index].is_empty() {
            self.free.remove(index);
        }
        DescriptorHandle {
            kind: self.kind,
            heap: self.native.id,
            start,
            count,
            cpu: self.native.cpu_start.offset(start, self.native.increment),
            gpu: self
                .native
                .gpu_start
                .map(|gpu| gpu.offset(start, self.native.increment)),
            increment: self.native.increment,
            next: None,
        }
    }

    /// Returns `true` if any descriptor of the handle's first range is
    /// already free.
    pub fn overlaps_free(&self, handle: &DescriptorHandle) -> bool {
        let end = handle.start + handle.count;
        self.free
            .iter()
            .any(|range| range.start < end && handle.start < range.end)
    }

    /// Returns one range of a handle to the heap. Chained ranges are ignored.
    ///
    /// Ranges that reach past the heap or are already free are ignored.
    ///
    /// ## Returns
    /// `true` if the range was added to the free list.
    pub fn free(&mut self, handle: &DescriptorHandle) -> bool {
        debug_assert_eq!(handle.heap, self.native.id);
        let end = handle.start + handle.count;
        if end > self.capacity {
            log::warn!(
                "DescriptorHeap({:?}): Ignoring free of out-of-range descriptors {}..{}",
                self.native.id,
                handle.start,
                end
            );
            return false;
        }
        if self.overlaps_free(handle) {
            log::warn!(
                "DescriptorHeap({:?}): Ignoring second free of descriptors {}..{}",
                self.native.id,
                handle.start,
                end
            );
            return false;
        }
        self.free.push(handle.start..end);
        true
    }

    /// Marks every descriptor as free.
    pub fn reset(&mut self) {
        self.free.clear();
        self.free.push(0..self.capacity);
    }

    /// Sorts the free ranges and merges the ones that touch.
    ///
    /// ## Returns
    /// The number of ranges merged away.
    pub fn defragment(&mut self) -> usize {
        let before = self.free.len();
        self.free.sort_unstable_by_key(|range| range.start);
        let mut merged: Vec<Range<u32>> = Vec::with_capacity(before);
        for range in self.free.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end >= range.start => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        self.free = merged;
        before - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CpuDescriptor, GpuDescriptor};

    fn heap(capacity: u32, gpu_visible: bool) -> DescriptorHeap {
        DescriptorHeap::new(
            NativeDescriptorHeap {
                id: DescriptorHeapId(7),
                cpu_start: CpuDescriptor(1000),
                gpu_start: gpu_visible.then_some(GpuDescriptor(9000)),
                increment: 16,
            },
            DescriptorHeapKind::Resource,
            capacity,
        )
    }

    #[test]
    fn test_allocations_are_contiguous() {
        let mut heap = heap(16, true);
        let first = heap.allocate(4).unwrap();
        let second = heap.allocate(6).unwrap();
        assert_eq!((first.start(), first.len()), (0, 4));
        assert_eq!((second.start(), second.len()), (4, 6));
        assert_eq!(second.cpu(), CpuDescriptor(1000 + 4 * 16));
        assert_eq!(second.gpu(), Some(GpuDescriptor(9000 + 4 * 16)));
        assert_eq!(heap.available(), 6);
        assert!(heap.allocate(7).is_none());
        assert!(heap.allocate(0).is_none());
    }

    #[test]
    fn test_first_fit_skips_small_holes() {
        let mut heap = heap(16, false);
        let a = heap.allocate(2).unwrap();
        let _b = heap.allocate(4).unwrap();
        heap.free(&a);
        let c = heap.allocate(3).unwrap();
        assert_eq!(c.start(), 6);
        let d = heap.allocate(2).unwrap();
        assert_eq!(d.start(), 9);
        assert_eq!(d.gpu(), None);
    }

    #[test]
    fn test_defragment_coalesces_free_ranges() {
        let mut heap = heap(12, false);
        let handles: Vec<_> = (0..4).map(|_| heap.allocate(3).unwrap()).collect();
        assert_eq!(heap.available(), 0);

        heap.free(&handles[2]);
        heap.free(&handles[0]);
        heap.free(&handles[1]);
        assert_eq!(heap.fragment_count(), 3);
        assert!(heap.allocate(9).is_none());

        assert_eq!(heap.defragment(), 2);
        assert_eq!(heap.fragment_count(), 1);
        let merged = heap.allocate(9).unwrap();
        assert_eq!(merged.start(), 0);
    }

    #[test]
    fn test_reset_frees_everything() {
        let mut heap = heap(8, true);
        heap.allocate(5).unwrap();
        heap.allocate(3).unwrap();
        heap.reset();
        assert_eq!(heap.available(), 8);
        assert_eq!(heap.allocate(8).unwrap().start(), 0);
    }

    #[test]
    fn test_double_free_is_ignored() {
        let mut heap = heap(8, false);
        let a = heap.allocate(4).unwrap();
        let _b = heap.allocate(4).unwrap();

        assert!(heap.free(&a));
        assert!(heap.overlaps_free(&a));
        assert!(!heap.free(&a.clone()));
        assert_eq!(heap.available(), 4);

        let x = heap.allocate(4).unwrap();
        assert_eq!(x.start(), 0);
        assert!(heap.allocate(4).is_none());
    }

    #[test]
    fn test_partial_allocation_takes_first_range() {
        let mut heap = heap(8, false);
        let a = heap.allocate(2).unwrap();
        heap.allocate(2).unwrap();
        heap.free(&a);
        let partial = heap.allocate_partial(5).unwrap();
        assert_eq!((partial.start(), partial.len()), (4, 4));
        let rest = heap.allocate_partial(5).unwrap();
        assert_eq!((rest.start(), rest.len()), (0, 2));
        assert!(heap.allocate_partial(1).is_none());
    }
}
