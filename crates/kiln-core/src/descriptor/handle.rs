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

use crate::api::{CpuDescriptor, DescriptorHeapId, DescriptorHeapKind, GpuDescriptor};

/// A range of descriptors allocated from one heap.
///
/// An allocation that could not be satisfied by a single range chains the
/// remaining ranges through [`next`](Self::next). Indices passed to
/// [`cpu_at`](Self::cpu_at) run across the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorHandle {
    pub(crate) kind: DescriptorHeapKind,
    pub(crate) heap: DescriptorHeapId,
    pub(crate) start: u32,
    pub(crate) count: u32,
    pub(crate) cpu: CpuDescriptor,
    pub(crate) gpu: Option<GpuDescriptor>,
    pub(crate) increment: u32,
    pub(crate) next: Option<Box<DescriptorHandle>>,
}

impl DescriptorHandle {
    /// The kind of heap the descriptors live in.
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// The heap holding this range.
    pub fn heap(&self) -> DescriptorHeapId {
        self.heap
    }

    /// Index of the first descriptor of this range within its heap.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Descriptors in this range, excluding chained ranges.
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Always `false` for handles returned by an allocator.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Descriptors across the whole chain.
    pub fn total_len(&self) -> u32 {
        self.ranges().map(DescriptorHandle::len).sum()
    }

    /// CPU address of the first descriptor of this range.
    pub fn cpu(&self) -> CpuDescriptor {
        self.cpu
    }

    /// GPU address of the first descriptor, for shader-visible heaps only.
    pub fn gpu(&self) -> Option<GpuDescriptor> {
        self.gpu
    }

    /// The next range of a chained allocation.
    pub fn next(&self) -> Option<&DescriptorHandle> {
        self.next.as_deref()
    }

    /// Iterates over this range and every chained one.
    pub fn ranges(&self) -> impl Iterator<Item = &DescriptorHandle> {
        std::iter::successors(Some(self), |range| range.next())
    }

    /// CPU address of descriptor `index`, counted across the chain.
    pub fn cpu_at(&self, index: u32) -> Option<CpuDescriptor> {
        self.locate(index)
            .map(|(range, local)| range.cpu.offset(local, range.increment))
    }

    /// GPU address of descriptor `index`, counted across the chain.
    pub fn gpu_at(&self, index: u32) -> Option<GpuDescriptor> {
        self.locate(index)
            .and_then(|(range, local)| Some(range.gpu?.offset(local, range.increment)))
    }

    fn locate(&self, mut index: u32) -> Option<(&DescriptorHandle, u32)> {
        for range in self.ranges() {
            if index < range.count {
                return Some((range, index));
            }
            index -= range.count;
        }
        None
    }

    /// Links `ranges` into a single chained handle, keeping their order.
    pub(crate) fn chain(ranges: Vec<DescriptorHandle>) -> Option<DescriptorHandle> {
        ranges.into_iter().rev().fold(None, |next, mut range| {
            range.next = next.map(Box::new);
            Some(range)
        })
    }

    /// Splits the chain into its individual ranges.
    pub(crate) fn into_ranges(self) -> Vec<DescriptorHandle> {
        let mut ranges = Vec::new();
        let mut current = Some(self);
        while let Some(mut range) = current {
            current = range.next.take().map(|next| *next);
            ranges.push(range);
        }
        ranges
    }
}
