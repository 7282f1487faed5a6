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

use super::allocator::DescriptorAllocator;
use super::handle::DescriptorHandle;
use crate::api::{CpuDescriptor, DescriptorHeapId, DescriptorHeapKind, GpuDescriptor};
use crate::error::DescriptorError;
use crate::frame::FrameBuffered;
use crate::settings::GpuSettings;
use crate::traits::{CommandRecorder, GraphicsDevice};
use smallvec::SmallVec;
use std::sync::Arc;

/// One entry of a sampler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerEntry {
    /// Baked into the pipeline; takes no table slot.
    Immutable,
    /// Read from the table. `None` leaves the slot unwritten.
    Heap(Option<CpuDescriptor>),
}

/// The CPU descriptors a draw or dispatch needs, in table order.
///
/// A `None` resource leaves a hole: its slot is reserved but not written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLayout {
    /// Constant buffer, shader resource and unordered access views.
    pub resources: Vec<Option<CpuDescriptor>>,
    /// Sampler states.
    pub samplers: Vec<SamplerEntry>,
}

/// The tables bound by [`DescriptorHeapManager::prepare_tables`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundTables {
    /// Start of the resource table, if the layout had resources.
    pub resources: Option<GpuDescriptor>,
    /// Start of the sampler table, if the layout had heap samplers.
    pub samplers: Option<GpuDescriptor>,
}

/// Owns every descriptor heap of a table-binding device.
///
/// Long-lived view descriptors are allocated from CPU-visible heaps. Each
/// draw copies the descriptors it needs into a contiguous range of the
/// current frame's shader-visible heap and binds that range as a table.
/// The shader-visible heaps are buffered per frame in flight and reset in
/// [`prepare`](Self::prepare).
pub struct DescriptorHeapManager {
    device: Arc<dyn GraphicsDevice>,
    resources: DescriptorAllocator,
    samplers: DescriptorAllocator,
    render_targets: DescriptorAllocator,
    depth_stencils: DescriptorAllocator,
    gpu_resources: FrameBuffered<DescriptorAllocator>,
    gpu_samplers: FrameBuffered<DescriptorAllocator>,
}

impl DescriptorHeapManager {
    /// Creates the allocators. Native heaps are created on first use.
    pub fn new(device: Arc<dyn GraphicsDevice>, settings: &GpuSettings) -> Self {
        let page = settings.cpu_heap_page_size;
        let frames = settings.frames_in_flight;
        Self {
            device,
            resources: DescriptorAllocator::cpu(
                "CPU resource heap",
                DescriptorHeapKind::Resource,
                page,
            ),
            samplers: DescriptorAllocator::cpu(
                "CPU sampler heap",
                DescriptorHeapKind::Sampler,
                page,
            ),
            render_targets: DescriptorAllocator::cpu(
                "CPU render target heap",
                DescriptorHeapKind::RenderTarget,
                page,
            ),
            depth_stencils: DescriptorAllocator::cpu(
                "CPU depth stencil heap",
                DescriptorHeapKind::DepthStencil,
                page,
            ),
            gpu_resources: FrameBuffered::new(frames, |frame| {
                DescriptorAllocator::gpu(
                    format!("GPU resource table heap {frame}"),
                    DescriptorHeapKind::Resource,
                    settings.resource_table_heap_size,
                )
            }),
            gpu_samplers: FrameBuffered::new(frames, |frame| {
                DescriptorAllocator::gpu(
                    format!("GPU sampler table heap {frame}"),
                    DescriptorHeapKind::Sampler,
                    settings.sampler_table_heap_size,
                )
            }),
        }
    }

    fn cpu_allocator(&mut self, kind: DescriptorHeapKind) -> &mut DescriptorAllocator {
        match kind {
            DescriptorHeapKind::Resource => &mut self.resources,
            DescriptorHeapKind::Sampler => &mut self.samplers,
            DescriptorHeapKind::RenderTarget => &mut self.render_targets,
            DescriptorHeapKind::DepthStencil => &mut self.depth_stencils,
        }
    }

    /// Starts a frame: coalesces the CPU heaps and selects and resets the
    /// shader-visible heaps of `epoch`.
    pub fn prepare(&mut self, epoch: u64) {
        let merged = self.resources.defragment()
            + self.samplers.defragment()
            + self.render_targets.defragment()
            + self.depth_stencils.defragment();
        self.gpu_resources.prepare(epoch).reset();
        self.gpu_samplers.prepare(epoch).reset();
        log::trace!(
            "DescriptorHeapManager: Prepared frame {} (table heaps {}, {} ranges merged)",
            epoch,
            self.gpu_resources.current_index(),
            merged
        );
    }

    /// Allocates `count` long-lived descriptors of `kind`.
    ///
    /// ## Errors
    /// See [`DescriptorAllocator::allocate`].
    pub fn allocate(
        &mut self,
        kind: DescriptorHeapKind,
        count: u32,
    ) -> Result<DescriptorHandle, DescriptorError> {
        let device = self.device.clone();
        self.cpu_allocator(kind).allocate(device.as_ref(), count)
    }

    /// Returns a handle from [`allocate`](Self::allocate).
    ///
    /// ## Errors
    /// See [`DescriptorAllocator::free`].
    pub fn free(&mut self, handle: DescriptorHandle) -> Result<(), DescriptorError> {
        self.cpu_allocator(handle.kind()).free(handle)
    }

    /// Copies the descriptors of `layout` into the current frame's table
    /// heaps and binds them on `recorder`.
    ///
    /// The resource table is bound at root index `0`. The sampler table
    /// follows it, or takes index `0` when there is no resource table.
    ///
    /// ## Errors
    /// * `DescriptorError::HeapExhausted` - If the frame's table heap is full.
    /// * `DescriptorError::Backend` - If a table heap could not be created.
    pub fn prepare_tables(
        &mut self,
        layout: &TableLayout,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<BoundTables, DescriptorError> {
        let mut heaps: SmallVec<[DescriptorHeapId; 2]> = SmallVec::new();
        let mut tables: SmallVec<[GpuDescriptor; 2]> = SmallVec::new();
        let mut bound = BoundTables::default();

        if !layout.resources.is_empty() {
            let table = self.copy_table(
                DescriptorHeapKind::Resource,
                layout.resources.iter().copied(),
                layout.resources.len() as u32,
            )?;
            heaps.push(table.heap());
            tables.extend(table.gpu());
            bound.resources = table.gpu();
        }

        let heap_samplers = layout
            .samplers
            .iter()
            .filter_map(|entry| match entry {
                SamplerEntry::Immutable => None,
                SamplerEntry::Heap(descriptor) => Some(*descriptor),
            });
        let count = heap_samplers.clone().count() as u32;
        if count > 0 {
            let table = self.copy_table(DescriptorHeapKind::Sampler, heap_samplers, count)?;
            heaps.push(table.heap());
            tables.extend(table.gpu());
            bound.samplers = table.gpu();
        }

        if !heaps.is_empty() {
            recorder.set_descriptor_heaps(&heaps);
            for (root_index, table) in tables.into_iter().enumerate() {
                recorder.set_descriptor_table(root_index as u32, table);
            }
        }
        Ok(bound)
    }

    fn copy_table(
        &mut self,
        kind: DescriptorHeapKind,
        descriptors: impl Iterator<Item = Option<CpuDescriptor>>,
        count: u32,
    ) -> Result<DescriptorHandle, DescriptorError> {
        let allocator = match kind {
            DescriptorHeapKind::Sampler => self.gpu_samplers.current_mut(),
            _ => self.gpu_resources.current_mut(),
        };
        let table = allocator.allocate(self.device.as_ref(), count)?;
        for (index, descriptor) in descriptors.enumerate() {
            let (Some(source), Some(destination)) = (descriptor, table.cpu_at(index as u32))
            else {
                continue;
            };
            self.device.copy_descriptors(1, destination, source, kind);
        }
        Ok(table)
    }

    /// Hands every native heap back to the backend.
    pub fn release(&mut self) {
        let device = self.device.clone();
        for allocator in [
            &mut self.resources,
            &mut self.samplers,
            &mut self.render_targets,
            &mut self.depth_stencils,
        ] {
            allocator.release(device.as_ref());
        }
        for allocator in self.gpu_resources.iter_mut() {
            allocator.release(device.as_ref());
        }
        for allocator in self.gpu_samplers.iter_mut() {
            allocator.release(device.as_ref());
        }
        log::debug!("DescriptorHeapManager: Released all descriptor heaps");
    }
}

impl std::fmt::Debug for DescriptorHeapManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHeapManager")
            .field("resources", &self.resources)
            .field("samplers", &self.samplers)
            .field("render_targets", &self.render_targets)
            .field("depth_stencils", &self.depth_stencils)
            .field("frame", &self.gpu_resources.current_index())
            .finish()
    }
}
