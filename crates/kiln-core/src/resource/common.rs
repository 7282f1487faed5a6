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

use crate::api::{
    BufferType, CpuDescriptor, DescriptorHeapKind, NativeHandle, NativeResource, ResourceFlags,
    ResourceFormat, SamplerId, ViewDescriptor, ViewKind,
};
use crate::binding::BindState;
use crate::descriptor::DescriptorHandle;
use crate::device::DeviceShared;
use crate::error::{BackendError, ResourceError};
use crate::traits::GraphicsDevice;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The view kinds a resource gets on table-binding devices.
pub(crate) fn view_kinds(
    flags: ResourceFlags,
    buffer_type: BufferType,
) -> SmallVec<[ViewKind; 3]> {
    let mut kinds = SmallVec::new();
    if !flags.is_shader_visible() {
        return kinds;
    }
    if buffer_type == BufferType::Constant {
        kinds.push(ViewKind::ConstantBuffer);
    } else {
        kinds.push(ViewKind::ShaderResource);
    }
    if flags.contains(ResourceFlags::UNORDERED_ACCESS) {
        kinds.push(ViewKind::UnorderedAccess);
    }
    kinds
}

/// What a resource's view descriptors currently describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ViewSource {
    Resource { resource: NativeResource, size: u64 },
    Sampler(SamplerId),
}

impl ViewSource {
    fn heap_kind(&self) -> DescriptorHeapKind {
        match self {
            Self::Resource { .. } => DescriptorHeapKind::Resource,
            Self::Sampler(_) => DescriptorHeapKind::Sampler,
        }
    }
}

#[derive(Debug)]
struct Views {
    handle: DescriptorHandle,
    kinds: SmallVec<[ViewKind; 3]>,
    source: ViewSource,
}

/// State common to every GPU resource.
#[derive(Debug)]
pub struct ResourceCore {
    label: String,
    flags: ResourceFlags,
    format: ResourceFormat,
    bind_state: BindState,
    last_used_frame: AtomicU64,
    last_frame_resized: AtomicU64,
    disposed: AtomicBool,
    views: Mutex<Option<Views>>,
    device: Arc<DeviceShared>,
}

impl ResourceCore {
    pub(crate) fn new(
        device: Arc<DeviceShared>,
        label: String,
        flags: ResourceFlags,
        format: ResourceFormat,
    ) -> Self {
        Self {
            label,
            flags,
            format,
            bind_state: BindState::new(),
            last_used_frame: AtomicU64::new(0),
            last_frame_resized: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            views: Mutex::new(None),
            device,
        }
    }

    /// The resource's debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The flags the resource was created with.
    pub fn flags(&self) -> ResourceFlags {
        self.flags
    }

    /// The element format. `Unknown` for structured and raw buffers.
    pub fn format(&self) -> ResourceFormat {
        self.format
    }

    /// Identity, version and slot back-references.
    pub fn bind_state(&self) -> &BindState {
        &self.bind_state
    }

    /// The current version, bumped on every re-creation of the native object.
    pub fn version(&self) -> u32 {
        self.bind_state.version()
    }

    /// The frame epoch in which the resource was last applied.
    pub fn last_used_frame(&self) -> u64 {
        self.last_used_frame.load(Ordering::Relaxed)
    }

    /// The frame epoch in which the resource was last resized.
    pub fn last_frame_resized(&self) -> u64 {
        self.last_frame_resized.load(Ordering::Relaxed)
    }

    /// Returns `true` once the resource has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        &self.device
    }

    pub(crate) fn touch(&self) {
        self.last_used_frame
            .store(self.device.frame_epoch(), Ordering::Relaxed);
    }

    pub(crate) fn mark_resized(&self) -> u32 {
        self.last_frame_resized
            .store(self.device.frame_epoch(), Ordering::Relaxed);
        self.bind_state.bump_version()
    }

    /// Returns `true` for the one caller that gets to tear the resource down.
    pub(crate) fn begin_dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), ResourceError> {
        if self.is_disposed() {
            return Err(ResourceError::Disposed(self.label.clone()));
        }
        Ok(())
    }

    /// Returns the native object for the current version, creating it and
    /// queuing any outdated one for release.
    pub(crate) fn realize<H: Copy>(
        &self,
        realization: &Realization<H>,
        bytes: u64,
        wrap: fn(H) -> NativeHandle,
        create: impl FnOnce(&dyn GraphicsDevice) -> Result<H, BackendError>,
    ) -> Result<H, ResourceError> {
        let device = &self.device;
        match realization.ensure(self.version(), bytes, || create(device.backend()))? {
            Realized::Current(handle) => Ok(handle),
            Realized::Created { handle, replaced } => {
                if let Some((old, old_bytes)) = replaced {
                    device.mark_for_release(wrap(old), old_bytes, &self.label);
                }
                device.stats().allocate_vram(bytes);
                log::trace!("{}: Created native object ({} bytes).", self.label, bytes);
                Ok(handle)
            }
        }
    }

    /// The CPU descriptor holding the resource's `kind` view, once written.
    ///
    /// Only table-binding devices write views, and only for kinds the
    /// resource's flags allow.
    pub fn view(&self, kind: ViewKind) -> Option<CpuDescriptor> {
        let views = self.views.lock();
        let views = views.as_ref()?;
        if matches!(views.source, ViewSource::Sampler(_)) {
            return None;
        }
        let index = views.kinds.iter().position(|&view| view == kind)?;
        views.handle.cpu_at(index as u32)
    }

    pub(crate) fn sampler_view(&self) -> Option<CpuDescriptor> {
        let views = self.views.lock();
        let views = views.as_ref()?;
        match views.source {
            ViewSource::Sampler(_) => views.handle.cpu_at(0),
            ViewSource::Resource { .. } => None,
        }
    }

    /// Writes the view descriptors for `source` on table-binding devices.
    ///
    /// Descriptors are allocated on the first write and reused afterwards.
    /// They are rewritten only when `source` changes, i.e. after the native
    /// object was re-created.
    pub(crate) fn write_views(
        &self,
        source: ViewSource,
        kinds: &[ViewKind],
    ) -> Result<(), ResourceError> {
        let Some(manager) = self.device.descriptors() else {
            return Ok(());
        };
        let count = match source {
            ViewSource::Resource { .. } => kinds.len() as u32,
            ViewSource::Sampler(_) => 1,
        };
        if count == 0 || self.device.is_shutting_down() {
            return Ok(());
        }

        let mut views = self.views.lock();
        if views.as_ref().is_some_and(|current| current.source == source) {
            return Ok(());
        }
        let handle = match views.take() {
            Some(current) => current.handle,
            None => manager.lock().allocate(source.heap_kind(), count)?,
        };

        let backend = self.device.backend();
        match source {
            ViewSource::Resource { resource, size } => {
                for (index, &kind) in kinds.iter().enumerate() {
                    let Some(destination) = handle.cpu_at(index as u32) else {
                        continue;
                    };
                    let view = ViewDescriptor {
                        kind,
                        resource,
                        size,
                        format: self.format,
                    };
                    backend.write_view_descriptor(&view, destination);
                }
            }
            ViewSource::Sampler(sampler) => {
                if let Some(destination) = handle.cpu_at(0) {
                    backend.write_sampler_descriptor(sampler, destination);
                }
            }
        }
        log::trace!("{}: Wrote {} view descriptor(s).", self.label, count);

        *views = Some(Views {
            handle,
            kinds: kinds.iter().copied().collect(),
            source,
        });
        Ok(())
    }

    /// Returns the view descriptors to the heap manager.
    ///
    /// Tables copy descriptors when they are built, so the range can be
    /// reused right away. After shutdown the heaps are gone and nothing is
    /// returned.
    pub(crate) fn release_views(&self) {
        let Some(views) = self.views.lock().take() else {
            return;
        };
        let Some(manager) = self.device.descriptors() else {
            return;
        };
        if self.device.is_shutting_down() {
            return;
        }
        if let Err(e) = manager.lock().free(views.handle) {
            log::warn!("{}: Failed to free view descriptors: {}", self.label, e);
        }
    }

    /// Queues the native object, if any, for deferred release.
    pub(crate) fn release<H: Copy>(
        &self,
        realization: &Realization<H>,
        wrap: fn(H) -> NativeHandle,
    ) {
        if let Some((handle, bytes)) = realization.take() {
            self.device.mark_for_release(wrap(handle), bytes, &self.label);
        }
    }
}

pub(crate) enum Realized<H> {
    Current(H),
    Created {
        handle: H,
        replaced: Option<(H, u64)>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Native<H> {
    handle: H,
    version: u32,
    bytes: u64,
}

/// Lazily created native object tagged with the resource version it was
/// created for.
#[derive(Debug)]
pub(crate) struct Realization<H> {
    state: Mutex<Option<Native<H>>>,
}

impl<H: Copy> Realization<H> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> Option<H> {
        self.state.lock().map(|native| native.handle)
    }

    pub fn ensure<E>(
        &self,
        version: u32,
        bytes: u64,
        create: impl FnOnce() -> Result<H, E>,
    ) -> Result<Realized<H>, E> {
        let mut state = self.state.lock();
        if let Some(native) = *state {
            if native.version == version {
                return Ok(Realized::Current(native.handle));
            }
        }
        let handle = create()?;
        let replaced = state
            .replace(Native {
                handle,
                version,
                bytes,
            })
            .map(|old| (old.handle, old.bytes));
        Ok(Realized::Created { handle, replaced })
    }

    pub fn take(&self) -> Option<(H, u64)> {
        self.state.lock().take().map(|native| (native.handle, native.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realization_is_created_once_per_version() {
        let realization = Realization::<u64>::new();
        let mut created = 0;

        let first = realization
            .ensure::<()>(0, 16, || {
                created += 1;
                Ok(7)
            })
            .unwrap();
        assert!(matches!(first, Realized::Created { handle: 7, replaced: None }));

        let again = realization.ensure::<()>(0, 16, || Ok(8)).unwrap();
        assert!(matches!(again, Realized::Current(7)));
        assert_eq!(created, 1);

        let resized = realization.ensure::<()>(1, 32, || Ok(9)).unwrap();
        assert!(matches!(
            resized,
            Realized::Created {
                handle: 9,
                replaced: Some((7, 16))
            }
        ));
        assert_eq!(realization.take(), Some((9, 32)));
        assert_eq!(realization.handle(), None);
    }

    #[test]
    fn test_failed_creation_keeps_previous_state() {
        let realization = Realization::<u64>::new();
        assert!(realization.ensure(0, 4, || Err("refused")).is_err());
        assert_eq!(realization.handle(), None);
    }
}
