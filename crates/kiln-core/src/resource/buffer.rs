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

use super::copy::{validate_copy, validate_region_copy};
use super::{view_kinds, GpuResource, Realization, ResourceCore, ResourceKind, ViewSource};
use crate::api::*;
use crate::binding::{BindState, Bindable};
use crate::device::DeviceShared;
use crate::error::{AllocationError, GpuError, ResourceError};
use crate::task::{
    BufferGetTask, BufferSetTask, GpuPriority, ResourceCopyTask, TaskCallback, TaskManager,
};
use crate::traits::CommandRecorder;
use bytemuck::Pod;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Weak};

/// Rounds `value` up to the next multiple of `alignment`.
fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

#[derive(Default)]
struct Arena {
    allocated_bytes: u64,
    allocations: Vec<Arc<GpuBuffer>>,
    free: Vec<Arc<GpuBuffer>>,
}

/// A GPU buffer, either a root with its own native allocation or a block
/// carved out of a parent buffer.
///
/// Any buffer can hand out sub-buffers with [`allocate`](Self::allocate). Blocks
/// are placed by bumping a cursor through the parent's range; blocks returned
/// with [`free`](Self::free) are reused best-fit before the cursor grows. A
/// sub-buffer shares its root's native buffer at its own offset and keeps only
/// weak links to its parent and root.
pub struct GpuBuffer {
    core: ResourceCore,
    stride: u32,
    element_count: u32,
    buffer_type: BufferType,
    alignment: u32,
    offset: u64,
    parent: Option<Weak<GpuBuffer>>,
    root: Option<Weak<GpuBuffer>>,
    arena: Mutex<Arena>,
    native: Realization<BufferId>,
}

impl GpuBuffer {
    pub(crate) fn new_root(
        device: Arc<DeviceShared>,
        descriptor: &BufferDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        descriptor.flags.validate()?;
        let alignment = descriptor
            .alignment
            .max(device.settings().default_buffer_alignment)
            .max(1);
        let label = descriptor
            .label
            .as_deref()
            .map_or_else(|| format!("{:?} buffer", descriptor.buffer_type), str::to_owned);

        Ok(Self {
            core: ResourceCore::new(device, label, descriptor.flags, ResourceFormat::Unknown),
            stride: descriptor.stride,
            element_count: descriptor.element_count,
            buffer_type: descriptor.buffer_type,
            alignment,
            offset: 0,
            parent: None,
            root: None,
            arena: Mutex::new(Arena::default()),
            native: Realization::new(),
        })
    }

    /// The size of one element in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// The number of elements.
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// The intended use of the buffer.
    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    /// The alignment used by [`allocate`](Self::allocate) when none is given.
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// The byte offset of the buffer within its root. `0` for a root.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes of this buffer's range consumed by sub-allocations.
    pub fn allocated_bytes(&self) -> u64 {
        self.arena.lock().allocated_bytes
    }

    /// Returns `true` if the buffer owns its native allocation.
    pub fn is_root(&self) -> bool {
        self.root.is_none()
    }

    /// The buffer this one was allocated from, if it is still alive.
    pub fn parent(&self) -> Option<Arc<GpuBuffer>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Number of live sub-allocations, including freed ones awaiting reuse.
    pub fn sub_allocation_count(&self) -> usize {
        self.arena.lock().allocations.len()
    }

    /// Number of sub-allocations on the free list.
    pub fn free_count(&self) -> usize {
        self.arena.lock().free.len()
    }

    /// Carves a block of `stride * count` bytes out of this buffer.
    ///
    /// A freed block at least as large as the request is reused first,
    /// choosing the smallest one that fits. Otherwise the cursor advances to
    /// the next offset aligned to `alignment` (`0` uses the buffer's own
    /// alignment) within the root.
    ///
    /// ## Returns
    /// `None` if the remaining capacity cannot hold the block.
    ///
    /// ## Errors
    /// * `AllocationError::ZeroSized` - If the block would hold no bytes.
    /// * `AllocationError::ParentDisposed` - If this buffer was disposed.
    /// * `AllocationError::Resource` - If `flags` break a resource invariant.
    pub fn allocate(
        self: &Arc<Self>,
        stride: u32,
        count: u32,
        flags: ResourceFlags,
        buffer_type: BufferType,
        alignment: u32,
    ) -> Result<Option<Arc<GpuBuffer>>, AllocationError> {
        if self.core.is_disposed() {
            return Err(AllocationError::ParentDisposed(self.label().to_owned()));
        }
        flags.validate()?;
        let required = u64::from(stride) * u64::from(count);
        if required == 0 {
            return Err(AllocationError::ZeroSized(self.label().to_owned()));
        }
        let alignment = if alignment == 0 {
            self.alignment
        } else {
            alignment
        };

        let mut arena = self.arena.lock();

        let best_fit = arena
            .free
            .iter()
            .enumerate()
            .filter(|(_, block)| {
                !block.is_disposed()
                    && block.size_in_bytes() >= required
                    && block.offset % u64::from(alignment) == 0
            })
            .min_by_key(|(_, block)| block.size_in_bytes())
            .map(|(index, _)| index);
        if let Some(index) = best_fit {
            let block = arena.free.swap_remove(index);
            log::trace!(
                "{}: Reused freed block '{}' ({} bytes) for {} bytes.",
                self.label(),
                block.label(),
                block.size_in_bytes(),
                required
            );
            return Ok(Some(block));
        }

        let capacity = self.size_in_bytes();
        let aligned = align_up(self.offset + arena.allocated_bytes, u64::from(alignment));
        let local = aligned - self.offset;
        if local > capacity || capacity - local < required {
            log::trace!(
                "{}: Cannot fit {} bytes ({} of {} bytes allocated).",
                self.label(),
                required,
                arena.allocated_bytes,
                capacity
            );
            return Ok(None);
        }
        arena.allocated_bytes = local + required;

        let label = format!("{} [sub {}]", self.label(), arena.allocations.len());
        let root = self.root.clone().unwrap_or_else(|| Arc::downgrade(self));
        let block = Arc::new(GpuBuffer {
            core: ResourceCore::new(
                self.core.device().clone(),
                label,
                flags,
                ResourceFormat::Unknown,
            ),
            stride,
            element_count: count,
            buffer_type,
            alignment,
            offset: aligned,
            parent: Some(Arc::downgrade(self)),
            root: Some(root),
            arena: Mutex::new(Arena::default()),
            native: Realization::new(),
        });
        arena.allocations.push(block.clone());
        Ok(Some(block))
    }

    /// Allocates `num_bytes` raw bytes, inheriting this buffer's flags and type.
    pub fn allocate_bytes(
        self: &Arc<Self>,
        num_bytes: u32,
        alignment: u32,
    ) -> Result<Option<Arc<GpuBuffer>>, AllocationError> {
        self.allocate(1, num_bytes, self.flags(), self.buffer_type, alignment)
    }

    /// Allocates `count` elements of `stride` bytes, inheriting this buffer's
    /// flags and type, without extra alignment.
    pub fn allocate_like(
        self: &Arc<Self>,
        stride: u32,
        count: u32,
    ) -> Result<Option<Arc<GpuBuffer>>, AllocationError> {
        self.allocate(stride, count, self.flags(), self.buffer_type, 1)
    }

    /// Returns `block` to this buffer's free list.
    ///
    /// ## Errors
    /// * `AllocationError::NotParent` - If this buffer did not allocate `block`.
    /// * `AllocationError::AlreadyFreed` - If `block` is already on the free list.
    /// * `AllocationError::BlockDisposed` - If `block` was disposed. A disposed
    ///   block has already left this buffer and can never be handed out again.
    pub fn free(&self, block: &Arc<GpuBuffer>) -> Result<(), AllocationError> {
        if block.is_disposed() {
            return Err(AllocationError::BlockDisposed(block.label().to_owned()));
        }
        let is_parent = block
            .parent
            .as_ref()
            .is_some_and(|parent| std::ptr::eq(parent.as_ptr(), self));
        let mut arena = self.arena.lock();
        if !is_parent || !arena.allocations.iter().any(|a| Arc::ptr_eq(a, block)) {
            return Err(AllocationError::NotParent {
                parent: self.label().to_owned(),
                buffer: block.label().to_owned(),
            });
        }
        if arena.free.iter().any(|f| Arc::ptr_eq(f, block)) {
            return Err(AllocationError::AlreadyFreed(block.label().to_owned()));
        }
        arena.free.push(block.clone());
        Ok(())
    }

    /// Frees this sub-buffer through its parent.
    ///
    /// ## Errors
    /// * `AllocationError::NotSubAllocation` - If this is a root buffer.
    /// * `AllocationError::ParentDropped` - If the parent no longer exists.
    pub fn release_to_parent(self: &Arc<Self>) -> Result<(), AllocationError> {
        let Some(parent) = &self.parent else {
            return Err(AllocationError::NotSubAllocation(self.label().to_owned()));
        };
        let parent = parent
            .upgrade()
            .ok_or_else(|| AllocationError::ParentDropped(self.label().to_owned()))?;
        parent.free(self)
    }

    /// Forgets a disposed block. Its bytes stay consumed until the root goes.
    fn detach(&self, block: &GpuBuffer) {
        let mut arena = self.arena.lock();
        arena.allocations.retain(|a| !std::ptr::eq(Arc::as_ptr(a), block));
        arena.free.retain(|f| !std::ptr::eq(Arc::as_ptr(f), block));
    }

    fn require(&self, flag: ResourceFlags, operation: &'static str) -> Result<(), ResourceError> {
        if !self.flags().contains(flag) {
            return Err(ResourceError::MissingFlag {
                label: self.label().to_owned(),
                operation,
                required: flag,
            });
        }
        Ok(())
    }

    fn check_range(&self, offset: u64, size: u64) -> Result<(), ResourceError> {
        let capacity = self.size_in_bytes();
        if !offset.checked_add(size).is_some_and(|end| end <= capacity) {
            return Err(ResourceError::OutOfBounds {
                label: self.label().to_owned(),
                offset,
                size,
                capacity,
            });
        }
        Ok(())
    }

    /// Uploads `data` at `byte_offset`.
    ///
    /// The bytes are copied into the task, so `data` may be dropped as soon as
    /// this returns.
    ///
    /// ## Errors
    /// * `ResourceError::MissingFlag` - If the buffer lacks `UPLOAD_MEMORY`. No task is built.
    /// * `ResourceError::OutOfBounds` - If the data does not fit.
    /// * `TaskError::MissingRecorder` - If `priority` is `Immediate` and `recorder` is `None`.
    pub fn set_data<T: Pod>(
        self: &Arc<Self>,
        tasks: &TaskManager,
        priority: GpuPriority,
        data: &[T],
        byte_offset: u64,
        recorder: Option<&mut dyn CommandRecorder>,
        on_completed: Option<TaskCallback>,
    ) -> Result<(), GpuError> {
        self.core.ensure_live()?;
        self.require(ResourceFlags::UPLOAD_MEMORY, "set_data")?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.check_range(byte_offset, bytes.len() as u64)?;

        let mut task = tasks.get::<BufferSetTask>();
        task.buffer = Some(self.clone());
        task.byte_offset = byte_offset;
        task.data.extend_from_slice(bytes);
        task.set_callback(on_completed);
        tasks.push(priority, task, recorder)?;
        Ok(())
    }

    /// Reads `count` elements starting at `byte_offset` and hands them to
    /// `callback` once the task has run, or `None` if the read failed.
    ///
    /// ## Errors
    /// * `ResourceError::MissingFlag` - If the buffer lacks `DOWNLOAD_MEMORY`.
    /// * `ResourceError::OutOfBounds` - If the range does not fit.
    /// * `TaskError::MissingRecorder` - If `priority` is `Immediate` and `recorder` is `None`.
    pub fn get_data<T: Pod>(
        self: &Arc<Self>,
        tasks: &TaskManager,
        priority: GpuPriority,
        count: u32,
        byte_offset: u64,
        recorder: Option<&mut dyn CommandRecorder>,
        callback: impl FnOnce(Option<Vec<T>>) + Send + 'static,
    ) -> Result<(), GpuError> {
        self.core.ensure_live()?;
        self.require(ResourceFlags::DOWNLOAD_MEMORY, "get_data")?;
        let byte_count = u64::from(count) * std::mem::size_of::<T>() as u64;
        self.check_range(byte_offset, byte_count)?;

        let mut task = tasks.get::<BufferGetTask>();
        task.buffer = Some(self.clone());
        task.byte_offset = byte_offset;
        task.byte_count = byte_count;
        task.on_data = Some(Box::new(move |bytes: Option<Vec<u8>>| {
            callback(bytes.map(|bytes| bytemuck::pod_collect_to_vec(&bytes)))
        }));
        tasks.push(priority, task, recorder)?;
        Ok(())
    }

    /// Copies the whole buffer into `destination`.
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

    /// Copies the byte range `range` of this buffer to `destination_offset`
    /// in `destination`.
    ///
    /// ## Errors
    /// * `CopyError` - If the copy can never succeed, see [`validate_region_copy`].
    #[allow(clippy::too_many_arguments)]
    pub fn copy_region_to(
        self: &Arc<Self>,
        tasks: &TaskManager,
        priority: GpuPriority,
        range: Range<u64>,
        destination: &Arc<dyn GpuResource>,
        destination_offset: u64,
        recorder: Option<&mut dyn CommandRecorder>,
        on_completed: Option<TaskCallback>,
    ) -> Result<(), GpuError> {
        validate_region_copy(self.as_ref(), &range, destination.as_ref(), destination_offset)?;
        let mut task = tasks.get::<ResourceCopyTask>();
        task.source = Some(self.clone());
        task.destination = Some(destination.clone());
        task.region = Some(range);
        task.destination_offset = destination_offset;
        task.set_callback(on_completed);
        tasks.push(priority, task, recorder)?;
        Ok(())
    }

    fn realize(&self) -> Result<BufferId, ResourceError> {
        let debug_labels = self.core.device().settings().debug_labels;
        let descriptor = BufferDescriptor {
            label: debug_labels.then(|| Cow::Borrowed(self.label())),
            stride: self.stride,
            element_count: self.element_count,
            flags: self.flags(),
            buffer_type: self.buffer_type,
            alignment: self.alignment,
        };
        self.core.realize(
            &self.native,
            self.size_in_bytes(),
            NativeHandle::Buffer,
            |device| device.create_buffer(&descriptor),
        )
    }

    fn upgrade_root(&self) -> Result<Option<Arc<GpuBuffer>>, ResourceError> {
        match &self.root {
            None => Ok(None),
            Some(root) => root
                .upgrade()
                .map(Some)
                .ok_or_else(|| ResourceError::RootDropped(self.label().to_owned())),
        }
    }
}

impl Bindable for GpuBuffer {
    fn bind_state(&self) -> &BindState {
        self.core.bind_state()
    }
}

impl GpuResource for GpuBuffer {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn size_in_bytes(&self) -> u64 {
        u64::from(self.stride) * u64::from(self.element_count)
    }

    fn apply(&self, recorder: &mut dyn CommandRecorder) -> Result<(), ResourceError> {
        self.core.ensure_live()?;
        self.core.touch();
        let id = match self.upgrade_root()? {
            None => self.realize()?,
            Some(root) => {
                root.apply(recorder)?;
                root.realize()?
            }
        };
        let resource = NativeResource::Buffer {
            id,
            offset: self.offset,
        };
        self.core.write_views(
            ViewSource::Resource {
                resource,
                size: self.size_in_bytes(),
            },
            &view_kinds(self.core.flags(), self.buffer_type),
        )?;
        recorder.reference(resource);
        Ok(())
    }

    fn native(&self) -> Option<NativeResource> {
        let id = match &self.root {
            None => self.native.handle()?,
            Some(root) => root.upgrade()?.native.handle()?,
        };
        Some(NativeResource::Buffer {
            id,
            offset: self.offset,
        })
    }

    fn dispose(&self) {
        if !self.core.begin_dispose() {
            return;
        }
        self.core.bind_state().unbind_all();
        self.core.release_views();

        let children = {
            let mut arena = self.arena.lock();
            arena.free.clear();
            std::mem::take(&mut arena.allocations)
        };
        for child in &children {
            child.dispose();
        }

        if self.is_root() {
            self.core.release(&self.native, NativeHandle::Buffer);
        } else if let Some(parent) = self.parent() {
            parent.detach(self);
        }
        log::trace!(
            "{}: Disposed ({} sub-allocation(s)).",
            self.label(),
            children.len()
        );
    }

    fn kind(&self) -> ResourceKind<'_> {
        ResourceKind::Buffer(self)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("label", &self.label())
            .field("size", &self.size_in_bytes())
            .field("offset", &self.offset)
            .field("flags", &self.flags())
            .field("root", &self.is_root())
            .finish()
    }
}
