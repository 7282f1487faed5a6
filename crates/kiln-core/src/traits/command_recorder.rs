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

//! The command recording contract.

use crate::api::*;
use crate::error::BackendError;
use std::any::Any;
use std::ops::Range;

/// A trait for an object that records a sequence of GPU commands.
///
/// A recorder is reused: [`begin`](Self::begin) resets it, commands are
/// appended, [`end`](Self::end) closes it and the device submits it.
/// Tasks replay their work against a recorder; the task manager owns one per
/// deferred priority and frame in flight, while `Immediate` work runs on the
/// caller's recorder.
pub trait CommandRecorder: Send {
    /// The recorder's debug label.
    fn label(&self) -> &str;

    /// Resets the recorder and opens it for recording.
    fn begin(&mut self) -> Result<(), BackendError>;

    /// Closes the recorder so it can be submitted.
    fn end(&mut self) -> Result<(), BackendError>;

    /// Opens a named debug scope, visible in GPU capture tools.
    fn begin_event(&mut self, label: &str);

    /// Closes the innermost debug scope.
    fn end_event(&mut self);

    /// Notifies the recorder that `resource` is referenced by the commands
    /// being recorded, so backends that track residency can keep it alive.
    fn reference(&mut self, _resource: NativeResource) {}

    /// Writes CPU data into a buffer.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8])
        -> Result<(), BackendError>;

    /// Reads buffer contents back into `destination`.
    fn read_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        destination: &mut [u8],
    ) -> Result<(), BackendError>;

    /// Records a buffer-to-buffer copy.
    fn copy_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), BackendError>;

    /// Records a copy of a whole texture into another one of identical shape.
    fn copy_texture(&mut self, source: TextureId, destination: TextureId)
        -> Result<(), BackendError>;

    /// Records a copy of buffer contents into a texture.
    fn copy_buffer_to_texture(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: TextureId,
    ) -> Result<(), BackendError>;

    /// Records a copy between two texture sub-resources.
    ///
    /// Sub-resource indices are `array_slice * mip_levels + mip_level`. A
    /// `None` region copies the whole source sub-resource.
    fn copy_subresource(
        &mut self,
        source: TextureId,
        source_subresource: u32,
        source_region: Option<ResourceRegion>,
        destination: TextureId,
        destination_subresource: u32,
        destination_origin: [u32; 3],
    ) -> Result<(), BackendError>;

    /// Records a clear of every sub-resource of a texture.
    fn clear_texture(&mut self, texture: TextureId, value: ClearValue) -> Result<(), BackendError>;

    /// Records a compute dispatch of `groups` thread groups.
    fn dispatch(&mut self, shader: ComputeShaderId, groups: [u32; 3]) -> Result<(), BackendError>;

    /// Records a non-indexed draw.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Makes descriptor heaps current for subsequent table bindings.
    fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeapId]);

    /// Binds a descriptor table at a root parameter index.
    fn set_descriptor_table(&mut self, root_index: u32, table: GpuDescriptor);

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
