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

use super::copy::{validate_copy, validate_subresource_copy, SubResourceCopy};
use super::{view_kinds, GpuResource, Realization, ResourceCore, ResourceKind, ViewSource};
use crate::api::*;
use crate::binding::{BindState, Bindable};
use crate::device::DeviceShared;
use crate::error::{GpuError, ResourceError};
use crate::task::{
    GpuPriority, ResourceCopyTask, SubResourceCopyTask, TaskCallback, TaskManager,
    TextureClearTask,
};
use crate::traits::CommandRecorder;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A 1D, 2D or 3D texture with optional mip chain and array layers.
pub struct GpuTexture {
    core: ResourceCore,
    extent: Mutex<[u32; 3]>,
    mip_levels: u32,
    array_layers: u32,
    native: Realization<TextureId>,
}

impl GpuTexture {
    pub(crate) fn new(
        device: Arc<DeviceShared>,
        descriptor: &TextureDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        descriptor.flags.validate()?;

        let mut required = FormatSupport::TEXTURE;
        if descriptor.flags.contains(ResourceFlags::UNORDERED_ACCESS) {
            required |= FormatSupport::UNORDERED_ACCESS;
        }
        let supported = device.backend().format_support(descriptor.format);
        if !supported.contains(required) {
            return Err(ResourceError::UnsupportedFormat {
                format: descriptor.format,
                required: required.difference(supported),
            });
        }

        let label = descriptor
            .label
            .as_deref()
            .map_or_else(|| format!("{:?} texture", descriptor.format), str::to_owned);

        Ok(Self {
            core: ResourceCore::new(device, label, descriptor.flags, descriptor.format),
            extent: Mutex::new([
                descriptor.width.max(1),
                descriptor.height.max(1),
                descriptor.depth.max(1),
            ]),
            mip_levels: descriptor.mip_levels.max(1),
            array_layers: descriptor.array_layers.max(1),
            native: Realization::new(),
        })
    }

    /// Width, height and depth of mip level 0.
    pub fn extent(&self) -> [u32; 3] {
        *self.extent.lock()
    }

    /// Width, height and depth of `level`, never below one texel.
    pub fn mip_extent(&self, level: u32) -> [u32; 3] {
        self.extent()
            .map(|size| size.checked_shr(level).unwrap_or(0).max(1))
    }

    /// The number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// The number of array layers.
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// The flat index of a sub-resource: `array_slice * mip_levels + mip_level`.
    pub fn subresource_index(&self, mip_level: u32, array_slice: u32) -> u32 {
        array_slice * self.mip_levels + mip_level
    }

    /// Changes the size of mip level 0.
    ///
    /// The native texture is re-created on the next `apply` and the old one is
    /// queued for release. Slots holding the texture rebind it on their next
    /// diff.
    ///
    /// ## Returns
    /// `false` if the size did not change.
    pub fn resize(&self, width: u32, height: u32) -> bool {
        let mut extent = self.extent.lock();
        let resized = [width.max(1), height.max(1), extent[2]];
        if *extent == resized {
            return false;
        }
        *extent = resized;
        drop(extent);
        let version = self.core.mark_resized();
        log::debug!(
            "{}: Resized to {}x{} (version {}).",
            self.label(),
            width,
            height,
            version
        );
        true
    }

    /// Clears every sub-resource to `value`.
    ///
    /// ## Errors
    /// * `ResourceError::MissingFlag` - If the texture is not GPU writable.
    /// * `TaskError::MissingRecorder` - If `priority` is `Immediate` and `recorder` is `None`.
    pub fn clear(
        self: &Arc<Self>,
        tasks: &TaskManager,
        priority: GpuPriority,
        value: ClearValue,
        recorder: Option<&mut dyn CommandRecorder>,
        on_completed: Option<TaskCallback>,
    ) -> Result<(), GpuError> {
        self.core.ensure_live()?;
        if !self.flags().is_gpu_writable() {
            return Err(ResourceError::MissingFlag {
                label: self.label().to_owned(),
                operation: "clear",
                required: ResourceFlags::GPU_WRITE,
            }
            .into());
        }
        let mut task = tasks.get::<TextureClearTask>();
        task.texture = Some(self.clone());
        task.value = Some(value);
        task.set_callback(on_completed);
        tasks.push(priority, task, recorder)?;
        Ok(())
    }

    /// Copies the whole texture into `destination`.
    ///
    /// ## Errors
    /// * `CopyError` - If the copy can never succeed, see [`validate_copy`].
    pub fn copy_to(
        self: &Arc<Self>,
        tasks: &TaskManager,
        priority: GpuPriority,
        destination: &Arc<dyn GpuResource>,
        recorder: Option<&mut dyn CommandRecorder>,
        on_completed: Option<TaskCallback>,
    ) -> Result<(), GpuError> {
        validate_copy(self.as_ref(), destination.as_ref())?;
        let mut task = tasks.get::<ResourceCopyTask>();
        task.source = Some(self.clone());
        task.destination = Some(destination.clone());
        task.set_callback(on_completed);
        tasks.push(priority, task, recorder)?;
        Ok(())
    }

    /// Copies one sub-resource, or a region of it, into `destination`.
    ///
    /// ## Errors
    /// * `CopyError` - If the copy can never succeed, see [`validate_subresource_copy`].
    pub fn copy_subresource_to(
        self: &Arc<Self>,
        tasks: &TaskManager,
        priority: GpuPriority,
        destination: &Arc<GpuTexture>,
        copy: SubResourceCopy,
        recorder: Option<&mut dyn CommandRecorder>,
        on_completed: Option<TaskCallback>,
    ) -> Result<(), GpuError> {
        validate_subresource_copy(self, destination, &copy)?;
        let mut task = tasks.get::<SubResourceCopyTask>();
        task.source = Some(self.clone());
        task.destination = Some(destination.clone());
        task.copy = copy;
        task.set_callback(on_completed);
        tasks.push(priority, task, recorder)?;
        Ok(())
    }

    fn realize(&self) -> Result<TextureId, ResourceError> {
        let [width, height, depth] = self.extent();
        let debug_labels = self.core.device().settings().debug_labels;
        let descriptor = TextureDescriptor {
            label: debug_labels.then(|| Cow::Borrowed(self.label())),
            width,
            height,
            depth,
            mip_levels: self.mip_levels,
            array_layers: self.array_layers,
            format: self.format(),
            flags: self.flags(),
        };
        self.core.realize(
            &self.native,
            self.size_in_bytes(),
            NativeHandle::Texture,
            |device| device.create_texture(&descriptor),
        )
    }
}

impl Bindable for GpuTexture {
    fn bind_state(&self) -> &BindState {
        self.core.bind_state()
    }
}

impl GpuResource for GpuTexture {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn size_in_bytes(&self) -> u64 {
        let texel = u64::from(self.format().bytes_per_texel());
        let per_layer: u64 = (0..self.mip_levels)
            .map(|level| {
                self.mip_extent(level)
                    .iter()
                    .map(|&size| u64::from(size))
                    .product::<u64>()
            })
            .sum();
        per_layer * u64::from(self.array_layers) * texel
    }

    fn apply(&self, recorder: &mut dyn CommandRecorder) -> Result<(), ResourceError> {
        self.core.ensure_live()?;
        self.core.touch();
        let id = self.realize()?;
        let resource = NativeResource::Texture(id);
        self.core.write_views(
            ViewSource::Resource {
                resource,
                size: self.size_in_bytes(),
            },
            &view_kinds(self.core.flags(), BufferType::Unknown),
        )?;
        recorder.reference(resource);
        Ok(())
    }

    fn native(&self) -> Option<NativeResource> {
        self.native.handle().map(NativeResource::Texture)
    }

    fn dispose(&self) {
        if !self.core.begin_dispose() {
            return;
        }
        self.core.bind_state().unbind_all();
        self.core.release_views();
        self.core.release(&self.native, NativeHandle::Texture);
        log::trace!("{}: Disposed.", self.label());
    }

    fn kind(&self) -> ResourceKind<'_> {
        ResourceKind::Texture(self)
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("label", &self.label())
            .field("extent", &self.extent())
            .field("mip_levels", &self.mip_levels)
            .field("array_layers", &self.array_layers)
            .field("format", &self.format())
            .finish()
    }
}
