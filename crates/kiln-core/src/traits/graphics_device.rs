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

//! The native device contract.

use crate::api::*;
use crate::error::BackendError;
use crate::traits::CommandRecorder;
use std::fmt::Debug;

/// The native device a backend exposes to the core.
///
/// The core never talks to a driver directly: resources are realized, command
/// lists are submitted and descriptor heaps are created through this trait.
/// Completion of submitted work is tracked with frame epochs; a backend signals
/// an epoch once every command list submitted with it has finished executing.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Creates a native buffer.
    /// ## Arguments
    /// * `descriptor` - Size, flags and intended use of the buffer.
    /// ## Errors
    /// * `BackendError` - If the driver refuses the allocation.
    fn create_buffer(&self, descriptor: &BufferDescriptor<'_>) -> Result<BufferId, BackendError>;

    /// Creates a native texture.
    /// ## Arguments
    /// * `descriptor` - Dimensions, format and flags of the texture.
    /// ## Errors
    /// * `BackendError` - If the driver refuses the allocation.
    fn create_texture(&self, descriptor: &TextureDescriptor<'_>)
        -> Result<TextureId, BackendError>;

    /// Creates a native sampler state object.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, BackendError>;

    /// Releases a native object. The core only calls this once no in-flight
    /// command list can reference the object any more.
    /// ## Errors
    /// * `BackendError` - If the handle is unknown to the backend.
    fn release(&self, handle: NativeHandle) -> Result<(), BackendError>;

    /// Creates a command recorder. Recorders are reused across frames, so this
    /// is called at most once per priority queue and frame slot.
    fn create_command_recorder(&self, label: &str)
        -> Result<Box<dyn CommandRecorder>, BackendError>;

    /// Submits everything recorded since the recorder's last `begin`.
    /// ## Arguments
    /// * `recorder` - A recorder created by this device, already ended.
    /// * `epoch` - The frame epoch the work belongs to; the backend reports it
    ///   through [`completed_epoch`](Self::completed_epoch) once it has executed.
    fn submit(&self, recorder: &mut dyn CommandRecorder, epoch: u64) -> Result<(), BackendError>;

    /// Returns the most recent epoch whose submitted work has fully executed.
    fn completed_epoch(&self) -> u64;

    /// Returns what the device can do with `format`.
    fn format_support(&self, format: ResourceFormat) -> FormatSupport;

    /// Returns the device's hard limits.
    fn limits(&self) -> DeviceLimits {
        DeviceLimits::default()
    }

    /// Returns how shader resources are bound on this device.
    fn binding_model(&self) -> BindingModel {
        BindingModel::Slots
    }

    /// Creates a native descriptor heap. Only called for
    /// [`BindingModel::DescriptorTables`] devices.
    fn create_descriptor_heap(
        &self,
        descriptor: &DescriptorHeapDescriptor<'_>,
    ) -> Result<NativeDescriptorHeap, BackendError>;

    /// Copies `count` consecutive descriptors between heaps of the same kind.
    fn copy_descriptors(
        &self,
        count: u32,
        destination: CpuDescriptor,
        source: CpuDescriptor,
        kind: DescriptorHeapKind,
    );

    /// Writes a view of a realized resource into a CPU descriptor. Only
    /// called for [`BindingModel::DescriptorTables`] devices.
    fn write_view_descriptor(&self, view: &ViewDescriptor, destination: CpuDescriptor);

    /// Writes a sampler state into a CPU descriptor of a sampler heap. Only
    /// called for [`BindingModel::DescriptorTables`] devices.
    fn write_sampler_descriptor(&self, sampler: SamplerId, destination: CpuDescriptor);
}
