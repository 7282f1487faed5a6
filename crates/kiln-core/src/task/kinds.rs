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

//! Built-in task kinds used by the resource operations.
//!
//! Every kind applies the resources it touches before recording, so a task
//! queued against a resource that was never applied still finds its native
//! object. Failures are logged and reported through the completion callback.

use super::GpuTask;
use crate::api::{BufferId, ClearValue, ComputeShaderId, DeviceLimits, NativeResource, TextureId};
use crate::binding::{StageBindings, StageLayout};
use crate::device::DeviceShared;
use crate::error::{BackendError, GpuError};
use crate::resource::{GpuBuffer, GpuResource, GpuTexture, SubResourceCopy};
use crate::traits::CommandRecorder;
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;

/// Receives the bytes read back by a [`BufferGetTask`], or `None` on failure.
pub type DataCallback = Box<dyn FnOnce(Option<Vec<u8>>) + Send>;

fn buffer_location(
    buffer: &GpuBuffer,
    recorder: &mut dyn CommandRecorder,
) -> Result<(BufferId, u64), BackendError> {
    buffer
        .apply(recorder)
        .map_err(|e| BackendError::new(e.to_string()))?;
    match buffer.native() {
        Some(NativeResource::Buffer { id, offset }) => Ok((id, offset)),
        _ => Err(BackendError::new("buffer has no native allocation")),
    }
}

fn texture_id(
    texture: &GpuTexture,
    recorder: &mut dyn CommandRecorder,
) -> Result<TextureId, BackendError> {
    texture
        .apply(recorder)
        .map_err(|e| BackendError::new(e.to_string()))?;
    match texture.native() {
        Some(NativeResource::Texture(id)) => Ok(id),
        _ => Err(BackendError::new("texture has no native allocation")),
    }
}

/// Uploads bytes into a buffer.
#[derive(Default)]
pub struct BufferSetTask {
    /// The destination buffer.
    pub buffer: Option<Arc<GpuBuffer>>,
    /// Offset from the start of the buffer, in bytes.
    pub byte_offset: u64,
    /// The bytes to upload. Reused across pool round trips.
    pub data: Vec<u8>,
}

impl GpuTask for BufferSetTask {
    fn kind() -> &'static str {
        "BufferSetTask"
    }

    fn validate(&self) -> bool {
        self.buffer.is_some() && !self.data.is_empty()
    }

    fn process(&mut self, recorder: &mut dyn CommandRecorder) -> bool {
        let Some(buffer) = &self.buffer else {
            return false;
        };
        let result = buffer_location(buffer, recorder).and_then(|(id, offset)| {
            recorder.write_buffer(id, offset + self.byte_offset, &self.data)
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("GpuBuffer({}): Failed to upload data: {}", buffer.label(), e);
                false
            }
        }
    }

    fn clear_for_pool(&mut self) {
        self.buffer = None;
        self.byte_offset = 0;
        self.data.clear();
    }
}

/// Reads bytes back from a buffer.
#[derive(Default)]
pub struct BufferGetTask {
    /// The source buffer.
    pub buffer: Option<Arc<GpuBuffer>>,
    /// Offset from the start of the buffer, in bytes.
    pub byte_offset: u64,
    /// Number of bytes to read.
    pub byte_count: u64,
    /// Receives the data once the task has run.
    pub on_data: Option<DataCallback>,
}

impl GpuTask for BufferGetTask {
    fn kind() -> &'static str {
        "BufferGetTask"
    }

    fn validate(&self) -> bool {
        self.buffer.is_some() && self.byte_count > 0
    }

    fn process(&mut self, recorder: &mut dyn CommandRecorder) -> bool {
        let Some(buffer) = &self.buffer else {
            return false;
        };
        let mut bytes = vec![0u8; self.byte_count as usize];
        let result = buffer_location(buffer, recorder).and_then(|(id, offset)| {
            recorder.read_buffer(id, offset + self.byte_offset, &mut bytes)
        });
        let success = match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("GpuBuffer({}): Failed to read back data: {}", buffer.label(), e);
                false
            }
        };
        if let Some(on_data) = self.on_data.take() {
            on_data(success.then_some(bytes));
        }
        success
    }

    fn clear_for_pool(&mut self) {
        self.buffer = None;
        self.byte_offset = 0;
        self.byte_count = 0;
        self.on_data = None;
    }
}

/// Copies a whole resource, or a byte range of a buffer, into another resource.
#[derive(Default)]
pub struct ResourceCopyTask {
    /// The resource read from.
    pub source: Option<Arc<dyn GpuResource>>,
    /// The resource written to.
    pub destination: Option<Arc<dyn GpuResource>>,
    /// Byte range of a source buffer. `None` copies the whole source.
    pub region: Option<Range<u64>>,
    /// Byte offset into a destination buffer.
    pub destination_offset: u64,
}

impl ResourceCopyTask {
    fn record(
        source: &dyn GpuResource,
        destination: &dyn GpuResource,
        region: Option<Range<u64>>,
        destination_offset: u64,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<(), BackendError> {
        source
            .apply(recorder)
            .and_then(|()| destination.apply(recorder))
            .map_err(|e| BackendError::new(e.to_string()))?;

        match (source.native(), destination.native()) {
            (
                Some(NativeResource::Buffer { id: src, offset: src_offset }),
                Some(NativeResource::Buffer { id: dst, offset: dst_offset }),
            ) => {
                let range = region.unwrap_or(0..source.size_in_bytes());
                recorder.copy_buffer(
                    src,
                    src_offset + range.start,
                    dst,
                    dst_offset + destination_offset,
                    range.end - range.start,
                )
            }
            (Some(NativeResource::Texture(src)), Some(NativeResource::Texture(dst))) => {
                recorder.copy_texture(src, dst)
            }
            (
                Some(NativeResource::Buffer { id: src, offset: src_offset }),
                Some(NativeResource::Texture(dst)),
            ) => {
                let start = region.map_or(0, |range| range.start);
                recorder.copy_buffer_to_texture(src, src_offset + start, dst)
            }
            _ => Err(BackendError::new("unsupported copy direction")),
        }
    }
}

impl GpuTask for ResourceCopyTask {
    fn kind() -> &'static str {
        "ResourceCopyTask"
    }

    fn validate(&self) -> bool {
        self.source.is_some() && self.destination.is_some()
    }

    fn process(&mut self, recorder: &mut dyn CommandRecorder) -> bool {
        let (Some(source), Some(destination)) = (&self.source, &self.destination) else {
            return false;
        };
        match Self::record(
            source.as_ref(),
            destination.as_ref(),
            self.region.clone(),
            self.destination_offset,
            recorder,
        ) {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "{}: Failed to copy to '{}': {}",
                    source.label(),
                    destination.label(),
                    e
                );
                false
            }
        }
    }

    fn clear_for_pool(&mut self) {
        self.source = None;
        self.destination = None;
        self.region = None;
        self.destination_offset = 0;
    }
}

/// Copies one texture sub-resource, or a region of it, into another.
#[derive(Default)]
pub struct SubResourceCopyTask {
    /// The texture read from.
    pub source: Option<Arc<GpuTexture>>,
    /// The texture written to.
    pub destination: Option<Arc<GpuTexture>>,
    /// Which sub-resources and region to copy.
    pub copy: SubResourceCopy,
}

impl GpuTask for SubResourceCopyTask {
    fn kind() -> &'static str {
        "SubResourceCopyTask"
    }

    fn validate(&self) -> bool {
        self.source.is_some() && self.destination.is_some()
    }

    fn process(&mut self, recorder: &mut dyn CommandRecorder) -> bool {
        let (Some(source), Some(destination)) = (&self.source, &self.destination) else {
            return false;
        };
        let copy = self.copy;
        let result = texture_id(source, recorder).and_then(|src| {
            let dst = texture_id(destination, recorder)?;
            recorder.copy_subresource(
                src,
                source.subresource_index(copy.source_level, copy.source_slice),
                copy.region,
                dst,
                destination.subresource_index(copy.destination_level, copy.destination_slice),
                copy.destination_origin,
            )
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "GpuTexture({}): Failed to copy sub-resource to '{}': {}",
                    source.label(),
                    destination.label(),
                    e
                );
                false
            }
        }
    }

    fn clear_for_pool(&mut self) {
        self.source = None;
        self.destination = None;
        self.copy = SubResourceCopy::default();
    }
}

/// Clears every sub-resource of a texture.
#[derive(Default)]
pub struct TextureClearTask {
    /// The texture to clear.
    pub texture: Option<Arc<GpuTexture>>,
    /// The clear value.
    pub value: Option<ClearValue>,
}

impl GpuTask for TextureClearTask {
    fn kind() -> &'static str {
        "TextureClearTask"
    }

    fn validate(&self) -> bool {
        self.texture.is_some() && self.value.is_some()
    }

    fn process(&mut self, recorder: &mut dyn CommandRecorder) -> bool {
        let (Some(texture), Some(value)) = (&self.texture, self.value) else {
            return false;
        };
        let result =
            texture_id(texture, recorder).and_then(|id| recorder.clear_texture(id, value));
        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("GpuTexture({}): Failed to clear: {}", texture.label(), e);
                false
            }
        }
    }

    fn clear_for_pool(&mut self) {
        self.texture = None;
        self.value = None;
    }
}

/// The compute stage a dispatch reads from.
#[derive(Debug, Clone)]
pub struct DispatchBindings {
    /// The stage's binding slots.
    pub stage: Arc<Mutex<StageBindings>>,
    /// The slot ranges the shader declares. Only these are applied and
    /// copied into descriptor tables.
    pub layout: StageLayout,
}

/// Dispatches a compute shader.
#[derive(Default)]
pub struct ComputeTask {
    /// The shader to run.
    pub shader: Option<ComputeShaderId>,
    /// Thread groups along x, y and z.
    pub groups: [u32; 3],
    /// Limits checked before recording. `None` skips the check.
    pub limits: Option<DeviceLimits>,
    /// Resources bound before the dispatch is recorded.
    pub bindings: Option<DispatchBindings>,
    pub(crate) device: Option<Arc<DeviceShared>>,
}

impl ComputeTask {
    fn bind(&self, recorder: &mut dyn CommandRecorder) -> Result<(), GpuError> {
        let Some(bindings) = &self.bindings else {
            return Ok(());
        };
        let stage = bindings.stage.lock();
        match &self.device {
            Some(device) => device
                .bind_stage(&stage, &bindings.layout, recorder)
                .map(|_| ()),
            None => Ok(stage.apply_resources(&bindings.layout, recorder)?),
        }
    }
}

impl GpuTask for ComputeTask {
    fn kind() -> &'static str {
        "ComputeTask"
    }

    fn validate(&self) -> bool {
        self.shader.is_some() && self.groups.iter().all(|&count| count > 0)
    }

    fn process(&mut self, recorder: &mut dyn CommandRecorder) -> bool {
        let Some(shader) = self.shader else {
            return false;
        };
        let [x, y, z] = self.groups;
        if let Some(limits) = self.limits {
            if x > limits.max_dispatch_groups_xy
                || y > limits.max_dispatch_groups_xy
                || z > limits.max_dispatch_groups_z
            {
                log::error!(
                    "ComputeTask({:?}): Dispatch of {}x{}x{} groups exceeds the device limits {:?}",
                    shader,
                    x,
                    y,
                    z,
                    limits
                );
                return false;
            }
        }
        if let Err(e) = self.bind(recorder) {
            log::error!("ComputeTask({:?}): Failed to bind resources: {}", shader, e);
            return false;
        }
        match recorder.dispatch(shader, self.groups) {
            Ok(()) => true,
            Err(e) => {
                log::error!("ComputeTask({:?}): Failed to dispatch: {}", shader, e);
                false
            }
        }
    }

    fn clear_for_pool(&mut self) {
        self.shader = None;
        self.groups = [0; 3];
        self.limits = None;
        self.bindings = None;
        self.device = None;
    }
}
