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
use super::heap::DescriptorHeap;
use crate::api::{DescriptorHeapDescriptor, DescriptorHeapKind, NativeHandle};
use crate::error::DescriptorError;
use crate::traits::GraphicsDevice;

/// A growable set of descriptor heap pages of one kind.
///
/// CPU-visible allocators create pages on demand and may chain ranges from
/// several pages into one handle. GPU-visible allocators own a single page
/// and only hand out contiguous ranges, so every handle can be bound as one
/// table.
#[derive(Debug)]
pub struct DescriptorAllocator {
    label: String,
    kind: DescriptorHeapKind,
    page_capacity: u32,
    gpu_visible: bool,
    pages: Vec<DescriptorHeap>,
}

impl DescriptorAllocator {
    /// Creates an allocator for long-lived, CPU-visible descriptors.
    pub fn cpu(label: impl Into<String>, kind: DescriptorHeapKind, page_capacity: u32) -> Self {
        Self::new(label.into(), kind, page_capacity, false)
    }

    /// Creates an allocator for per-frame, shader-visible tables.
    pub fn gpu(label: impl Into<String>, kind: DescriptorHeapKind, capacity: u32) -> Self {
        Self::new(label.into(), kind, capacity, true)
    }

    fn new(label: String, kind: DescriptorHeapKind, page_capacity: u32, gpu_visible: bool) -> Self {
        Self {
            label,
            kind,
            page_capacity: page_capacity.max(1),
            gpu_visible,
            pages: Vec::new(),
        }
    }

    /// The kind of descriptors handed out.
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    /// Returns `true` for table allocators.
    pub fn is_gpu_visible(&self) -> bool {
        self.gpu_visible
    }

    /// The number of native heaps created so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Descriptors not currently allocated, over every page.
    pub fn available(&self) -> u32 {
        self.pages.iter().map(DescriptorHeap::available).sum()
    }

    /// Allocates `count` descriptors.
    ///
    /// ## Errors
    /// * `DescriptorError::ZeroSized` - If `count` is zero.
    /// * `DescriptorError::HeapExhausted` - If a table allocator has no
    ///   contiguous range of `count` descriptors left.
    /// * `DescriptorError::NotShaderVisible` - If the backend returned a table
    ///   heap without a GPU address.
    /// * `DescriptorError::Backend` - If a new page could not be created.
    pub fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        count: u32,
    ) -> Result<DescriptorHandle, DescriptorError> {
        if count == 0 {
            return Err(DescriptorError::ZeroSized(self.kind));
        }
        if self.gpu_visible {
            self.allocate_table(device, count)
        } else {
            self.allocate_chained(device, count)
        }
    }

    fn allocate_table(
        &mut self,
        device: &dyn GraphicsDevice,
        count: u32,
    ) -> Result<DescriptorHandle, DescriptorError> {
        let exhausted = DescriptorError::HeapExhausted {
            kind: self.kind,
            requested: count,
            capacity: self.page_capacity,
        };
        if count > self.page_capacity {
            return Err(exhausted);
        }
        if self.pages.is_empty() {
            self.create_page(device)?;
        }
        self.pages[0].allocate(count).ok_or(exhausted)
    }

    fn allocate_chained(
        &mut self,
        device: &dyn GraphicsDevice,
        count: u32,
    ) -> Result<DescriptorHandle, DescriptorError> {
        // A single range is preferred before spreading over several.
        if let Some(range) = self.pages.iter_mut().find_map(|page| page.allocate(count)) {
            return Ok(range);
        }

        let mut ranges = Vec::new();
        let mut remaining = count;

        let mut page = 0;
        while remaining > 0 {
            if page == self.pages.len() {
                if let Err(err) = self.create_page(device) {
                    self.release_ranges(ranges);
                    return Err(err);
                }
            }
            while remaining > 0 {
                match self.pages[page].allocate_partial(remaining) {
                    Some(range) => {
                        remaining -= range.len();
                        ranges.push(range);
                    }
                    None => break,
                }
            }
            page += 1;
        }

        DescriptorHandle::chain(ranges).ok_or(DescriptorError::ZeroSized(self.kind))
    }

    fn create_page(&mut self, device: &dyn GraphicsDevice) -> Result<(), DescriptorError> {
        let label = format!("{} [page {}]", self.label, self.pages.len());
        let native = device.create_descriptor_heap(&DescriptorHeapDescriptor {
            label: Some(label.as_str().into()),
            kind: self.kind,
            capacity: self.page_capacity,
            gpu_visible: self.gpu_visible,
        })?;
        if self.gpu_visible && native.gpu_start.is_none() {
            if let Err(err) = device.release(NativeHandle::DescriptorHeap(native.id)) {
                log::warn!("{}: Failed to release heap {:?}: {}", label, native.id, err);
            }
            return Err(DescriptorError::NotShaderVisible(self.kind));
        }

        log::debug!(
            "{}: Created {:?} heap ({} descriptors)",
            label,
            self.kind,
            self.page_capacity
        );
        self.pages
            .push(DescriptorHeap::new(native, self.kind, self.page_capacity));
        Ok(())
    }

    /// Returns every range of `handle` to the page it came from.
    ///
    /// ## Errors
    /// * `DescriptorError::ForeignHandle` - If the handle is of another kind.
    /// * `DescriptorError::UnknownHeap` - If a range points into a heap this
    ///   allocator does not own.
    /// * `DescriptorError::AlreadyFreed` - If a range is already free.
    ///
    /// Every range is checked before any is freed, so a failed call frees nothing.
    pub fn free(&mut self, handle: DescriptorHandle) -> Result<(), DescriptorError> {
        if handle.kind() != self.kind {
            return Err(DescriptorError::ForeignHandle {
                expected: self.kind,
                found: handle.kind(),
            });
        }
        let ranges = handle.into_ranges();
        let mut pages = Vec::with_capacity(ranges.len());
        for range in &ranges {
            let page = self
                .pages
                .iter()
                .position(|page| page.id() == range.heap())
                .ok_or(DescriptorError::UnknownHeap {
                    kind: self.kind,
                    heap: range.heap(),
                })?;
            if self.pages[page].overlaps_free(range) {
                return Err(DescriptorError::AlreadyFreed {
                    kind: self.kind,
                    heap: range.heap(),
                    start: range.start(),
                });
            }
            pages.push(page);
        }
        for (page, range) in pages.into_iter().zip(&ranges) {
            self.pages[page].free(range);
        }
        Ok(())
    }

    fn release_ranges(&mut self, ranges: Vec<DescriptorHandle>) {
        for range in ranges {
            if let Some(page) = self.pages.iter_mut().find(|page| page.id() == range.heap()) {
                page.free(&range);
            }
        }
    }

    /// Marks every descriptor of every page as free.
    pub fn reset(&mut self) {
        for page in &mut self.pages {
            page.reset();
        }
    }

    /// Coalesces free ranges on every page.
    ///
    /// ## Returns
    /// The number of ranges merged away.
    pub fn defragment(&mut self) -> usize {
        self.pages.iter_mut().map(DescriptorHeap::defragment).sum()
    }

    /// Hands every page back to the backend.
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        for page in self.pages.drain(..) {
            if let Err(err) = device.release(NativeHandle::DescriptorHeap(page.id())) {
                log::warn!("{}: Failed to release heap {:?}: {}", self.label, page.id(), err);
            }
        }
    }
}
