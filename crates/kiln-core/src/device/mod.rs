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

//! The device context: resource factory, frame epochs and deferred release.
//!
//! A frame driver uses it like this:
//!
//! ```ignore
//! let epoch = context.begin_frame();           // retire releases, reset table heaps
//! context.process(GpuPriority::StartOfFrame)?;
//! // ... record draws, push Immediate work on the frame's recorder ...
//! context.process(GpuPriority::EndOfFrame)?;
//! ```

mod release;

use crate::api::*;
use crate::binding::{StageBindings, StageLayout};
use crate::descriptor::{BoundTables, DescriptorHeapManager};
use crate::error::{GpuError, ResourceError, TaskError};
use crate::resource::{GpuBuffer, GpuSampler, GpuTexture};
use crate::settings::GpuSettings;
use crate::stats::GpuStats;
use crate::task::{GpuPriority, TaskManager};
use crate::traits::{CommandRecorder, GraphicsDevice};
use parking_lot::{Mutex, MutexGuard};
use release::{PendingRelease, ReleaseQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// State shared by the context and every resource it created.
///
/// Resources hold an `Arc` to this rather than to the context, so nothing here
/// may own resources or tasks.
#[derive(Debug)]
pub(crate) struct DeviceShared {
    backend: Arc<dyn GraphicsDevice>,
    settings: GpuSettings,
    stats: Arc<GpuStats>,
    epoch: AtomicU64,
    shutting_down: AtomicBool,
    releases: ReleaseQueue,
    descriptors: Option<Mutex<DescriptorHeapManager>>,
}

impl DeviceShared {
    pub(crate) fn new(backend: Arc<dyn GraphicsDevice>, settings: GpuSettings) -> Self {
        let descriptors = (backend.binding_model() == BindingModel::DescriptorTables)
            .then(|| Mutex::new(DescriptorHeapManager::new(backend.clone(), &settings)));
        Self {
            backend,
            settings,
            descriptors,
            stats: Arc::new(GpuStats::new()),
            epoch: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            releases: ReleaseQueue::default(),
        }
    }

    pub(crate) fn backend(&self) -> &dyn GraphicsDevice {
        self.backend.as_ref()
    }

    pub(crate) fn settings(&self) -> &GpuSettings {
        &self.settings
    }

    pub(crate) fn stats(&self) -> &GpuStats {
        &self.stats
    }

    pub(crate) fn stats_handle(&self) -> Arc<GpuStats> {
        self.stats.clone()
    }

    /// The descriptor heap manager of a table-binding device.
    pub(crate) fn descriptors(&self) -> Option<&Mutex<DescriptorHeapManager>> {
        self.descriptors.as_ref()
    }

    /// Realizes the resources bound to `stage` and, on table-binding
    /// devices, copies their views into the frame's tables and binds them.
    ///
    /// Lock order is resource views, then the heap manager. The layout is
    /// read before the manager is locked.
    pub(crate) fn bind_stage(
        &self,
        stage: &StageBindings,
        shader: &StageLayout,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<Option<BoundTables>, GpuError> {
        stage.apply_resources(shader, recorder)?;
        let Some(descriptors) = &self.descriptors else {
            return Ok(None);
        };
        let layout = stage.table_layout(shader);
        let tables = descriptors.lock().prepare_tables(&layout, recorder)?;
        Ok(Some(tables))
    }

    pub(crate) fn frame_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Queues a native object for release once the current epoch has retired.
    /// During shutdown the object is released immediately.
    pub(crate) fn mark_for_release(&self, handle: NativeHandle, bytes: u64, label: &str) {
        let entry = PendingRelease {
            epoch: self.frame_epoch(),
            handle,
            bytes,
            label: label.to_owned(),
        };
        if self.is_shutting_down() {
            self.release_now(entry);
            return;
        }
        self.releases.push(entry);
        self.stats.set_pending_releases(self.releases.len());
    }

    fn collect_releases(&self) -> usize {
        let ready = self.releases.drain_completed(self.backend.completed_epoch());
        let released = ready.len();
        for entry in ready {
            self.release_now(entry);
        }
        self.stats.set_pending_releases(self.releases.len());
        released
    }

    fn release_all(&self) -> usize {
        let entries = self.releases.drain_all();
        let released = entries.len();
        for entry in entries {
            self.release_now(entry);
        }
        self.stats.set_pending_releases(0);
        released
    }

    fn release_now(&self, entry: PendingRelease) {
        if let Err(e) = self.backend.release(entry.handle) {
            log::warn!(
                "{}: Failed to release {:?}: {}",
                entry.label,
                entry.handle,
                e
            );
        }
        self.stats.deallocate_vram(entry.bytes);
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        // Entries queued after the context shut down.
        self.release_all();
    }
}

/// Owns the task manager, the deferred-release queue and the frame epoch of a
/// native [`GraphicsDevice`], and creates the resources that live on it.
///
/// The frame epoch starts at `1` and advances with every
/// [`begin_frame`](Self::begin_frame). Disposed resources are released once the
/// backend's completed epoch reaches the epoch they were disposed in.
pub struct DeviceContext {
    shared: Arc<DeviceShared>,
    tasks: TaskManager,
}

impl DeviceContext {
    /// Creates a context over `backend`.
    ///
    /// A descriptor heap manager is created when the backend binds through
    /// descriptor tables.
    pub fn new(backend: Arc<dyn GraphicsDevice>, settings: GpuSettings) -> Self {
        let settings = settings.sanitized();
        let binding_model = backend.binding_model();
        let shared = Arc::new(DeviceShared::new(backend, settings));
        let tasks = TaskManager::new(shared.clone());

        log::info!(
            "GPU device context initialized: {} frame(s) in flight, {:?} binding.",
            shared.settings().frames_in_flight,
            binding_model
        );

        Self { shared, tasks }
    }

    /// The native device.
    pub fn backend(&self) -> &dyn GraphicsDevice {
        self.shared.backend()
    }

    /// The settings the context was created with, after sanitizing.
    pub fn settings(&self) -> &GpuSettings {
        self.shared.settings()
    }

    /// Live counters for this context.
    pub fn stats(&self) -> &GpuStats {
        self.shared.stats()
    }

    /// A shared handle to the counters, e.g. for
    /// [`StageBindings::with_stats`](crate::binding::StageBindings::with_stats).
    pub fn stats_handle(&self) -> Arc<GpuStats> {
        self.shared.stats_handle()
    }

    /// The task manager that owns every task queue and pool.
    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// The current frame epoch.
    pub fn frame_epoch(&self) -> u64 {
        self.shared.frame_epoch()
    }

    /// Native objects still waiting for their epoch to retire.
    pub fn pending_releases(&self) -> usize {
        self.shared.releases.len()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Locks the descriptor heap manager, if the backend binds through tables.
    ///
    /// Resources lock the manager while they write their views, so the guard
    /// must not be held across `apply` or [`bind_stage`](Self::bind_stage).
    pub fn descriptors(&self) -> Option<MutexGuard<'_, DescriptorHeapManager>> {
        self.shared.descriptors().map(|manager| manager.lock())
    }

    /// Applies every resource bound to `stage` within the ranges `shader`
    /// declares and binds them for the next draw or dispatch.
    ///
    /// On [`BindingModel::DescriptorTables`] devices the views are copied into
    /// the current frame's table heaps and bound; slot-binding devices get
    /// `None` back.
    ///
    /// ## Errors
    /// * `GpuError::Resource` - If a bound resource cannot be realized.
    /// * `GpuError::Descriptor` - If the frame's table heap is exhausted.
    pub fn bind_stage(
        &self,
        stage: &StageBindings,
        shader: &StageLayout,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<Option<BoundTables>, GpuError> {
        self.shared.bind_stage(stage, shader, recorder)
    }

    /// Creates a root buffer. Native memory is allocated on first `apply`.
    ///
    /// ## Errors
    /// * `ResourceError::InvalidFlags` - If the descriptor's flags break a resource invariant.
    pub fn create_buffer(
        &self,
        descriptor: &BufferDescriptor<'_>,
    ) -> Result<Arc<GpuBuffer>, ResourceError> {
        GpuBuffer::new_root(self.shared.clone(), descriptor).map(Arc::new)
    }

    /// Creates a texture. Native memory is allocated on first `apply`.
    ///
    /// ## Errors
    /// * `ResourceError::InvalidFlags` - If the descriptor's flags break a resource invariant.
    /// * `ResourceError::UnsupportedFormat` - If the device cannot use the format as requested.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor<'_>,
    ) -> Result<Arc<GpuTexture>, ResourceError> {
        GpuTexture::new(self.shared.clone(), descriptor).map(Arc::new)
    }

    /// Creates a sampler. The native state object is created on first `apply`.
    pub fn create_sampler(&self, label: &str, descriptor: SamplerDescriptor) -> Arc<GpuSampler> {
        Arc::new(GpuSampler::new(self.shared.clone(), label, descriptor))
    }

    /// Starts a new frame.
    ///
    /// Advances the frame epoch, releases every native object whose epoch the
    /// GPU has retired and, for table-binding backends, prepares the descriptor
    /// heaps for the new frame.
    pub fn begin_frame(&self) -> u64 {
        let epoch = self.shared.advance_epoch();
        let released = self.shared.collect_releases();
        if let Some(descriptors) = self.shared.descriptors() {
            descriptors.lock().prepare(epoch);
        }
        log::trace!("Frame epoch {epoch} started, {released} native object(s) released.");
        epoch
    }

    /// Drains one deferred priority queue. See [`TaskManager::process`].
    pub fn process(&self, priority: GpuPriority) -> Result<usize, TaskError> {
        self.tasks.process(priority)
    }

    /// Releases everything still queued and switches to synchronous release.
    ///
    /// Resources disposed after this call are released immediately. Calling it
    /// more than once has no further effect.
    pub fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let abandoned = self.tasks.pending(GpuPriority::StartOfFrame)
            + self.tasks.pending(GpuPriority::EndOfFrame);
        if abandoned > 0 {
            log::warn!("Shutting down with {abandoned} unprocessed GPU task(s).");
        }

        let released = self.shared.release_all();
        if let Some(descriptors) = self.shared.descriptors() {
            descriptors.lock().release();
        }
        log::info!("GPU device context shut down, {released} native object(s) released.");
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{SamplerEntry, TableLayout};
    use crate::resource::GpuResource;
    use crate::test_support::{self, MockGraphicsDevice, Recorded};

    fn context() -> (Arc<MockGraphicsDevice>, DeviceContext) {
        test_support::init_logging();
        let device = MockGraphicsDevice::new();
        let context = DeviceContext::new(device.clone(), GpuSettings::default());
        (device, context)
    }

    #[test]
    fn test_begin_frame_advances_epoch() {
        let (_device, context) = context();
        assert_eq!(context.frame_epoch(), 1);
        assert_eq!(context.begin_frame(), 2);
        assert_eq!(context.begin_frame(), 3);
        assert_eq!(context.frame_epoch(), 3);
    }

    #[test]
    fn test_disposed_resource_waits_for_its_epoch() {
        let (device, context) = context();
        let mut recorder = device.recorder("test");
        let buffer = context
            .create_buffer(&BufferDescriptor {
                label: Some("Vertices".into()),
                stride: 16,
                element_count: 4,
                ..Default::default()
            })
            .unwrap();
        buffer.apply(&mut recorder).unwrap();
        assert_eq!(context.stats().allocated_vram(), 64);

        buffer.dispose();
        assert_eq!(context.pending_releases(), 1);
        assert_eq!(device.released().len(), 0);

        // The GPU has not finished epoch 1 yet.
        context.begin_frame();
        assert_eq!(context.pending_releases(), 1);

        device.set_completed_epoch(1);
        context.begin_frame();
        assert_eq!(context.pending_releases(), 0);
        assert_eq!(device.released().len(), 1);
        assert_eq!(context.stats().allocated_vram(), 0);
    }

    #[test]
    fn test_release_is_synchronous_during_shutdown() {
        let (device, context) = context();
        let mut recorder = device.recorder("test");
        let texture = context.create_texture(&TextureDescriptor::default()).unwrap();
        texture.apply(&mut recorder).unwrap();

        context.shutdown();
        assert!(context.is_shutting_down());

        texture.dispose();
        assert_eq!(context.pending_releases(), 0);
        assert_eq!(device.released().len(), 1);
    }

    #[test]
    fn test_shutdown_flushes_pending_releases() {
        let (device, context) = context();
        let mut recorder = device.recorder("test");
        let buffer = context
            .create_buffer(&BufferDescriptor {
                stride: 4,
                element_count: 8,
                ..Default::default()
            })
            .unwrap();
        buffer.apply(&mut recorder).unwrap();
        drop(buffer);
        assert_eq!(context.pending_releases(), 1);

        context.shutdown();
        assert_eq!(context.pending_releases(), 0);
        assert_eq!(device.released().len(), 1);
    }

    #[test]
    fn test_slot_backend_has_no_descriptor_manager() {
        let (_device, context) = context();
        assert!(context.descriptors().is_none());

        let device = MockGraphicsDevice::with_tables();
        let context = DeviceContext::new(device, GpuSettings::default());
        assert!(context.descriptors().is_some());
    }

    fn table_context() -> (Arc<MockGraphicsDevice>, DeviceContext) {
        test_support::init_logging();
        let device = MockGraphicsDevice::with_tables();
        let context = DeviceContext::new(device.clone(), GpuSettings::default());
        (device, context)
    }

    fn view_writes(device: &MockGraphicsDevice) -> usize {
        device
            .journal()
            .iter()
            .filter(|entry| matches!(entry, Recorded::WriteView { .. }))
            .count()
    }

    #[test]
    fn test_views_follow_resource_lifetime() {
        let (device, context) = table_context();
        let mut recorder = device.recorder("test");
        let descriptor = BufferDescriptor {
            label: Some("Particles".into()),
            stride: 16,
            element_count: 64,
            flags: ResourceFlags::GPU_READ | ResourceFlags::UNORDERED_ACCESS,
            buffer_type: BufferType::Structured,
            ..Default::default()
        };
        let buffer = context.create_buffer(&descriptor).unwrap();
        assert_eq!(buffer.core().view(ViewKind::ShaderResource), None);

        buffer.apply(&mut recorder).unwrap();
        let srv = buffer.core().view(ViewKind::ShaderResource).unwrap();
        let uav = buffer.core().view(ViewKind::UnorderedAccess).unwrap();
        assert_eq!(buffer.core().view(ViewKind::ConstantBuffer), None);
        assert_ne!(srv, uav);
        assert!(device.journal().contains(&Recorded::WriteView {
            kind: ViewKind::UnorderedAccess,
            resource: buffer.native().unwrap(),
            destination: uav,
        }));
        assert_eq!(view_writes(&device), 2);

        // Nothing changed natively, so nothing is rewritten.
        buffer.apply(&mut recorder).unwrap();
        assert_eq!(view_writes(&device), 2);

        buffer.dispose();
        assert_eq!(buffer.core().view(ViewKind::ShaderResource), None);

        // Coalescing puts the returned range first in line again.
        context.begin_frame();
        let next = context.create_buffer(&descriptor).unwrap();
        next.apply(&mut recorder).unwrap();
        assert_eq!(next.core().view(ViewKind::ShaderResource), Some(srv));
    }

    #[test]
    fn test_upload_buffers_get_no_views() {
        let (device, context) = table_context();
        let mut recorder = device.recorder("test");
        let staging = context
            .create_buffer(&BufferDescriptor {
                stride: 4,
                element_count: 4,
                flags: ResourceFlags::UPLOAD_MEMORY | ResourceFlags::DENY_SHADER_ACCESS,
                buffer_type: BufferType::Staging,
                ..Default::default()
            })
            .unwrap();
        staging.apply(&mut recorder).unwrap();
        assert_eq!(staging.core().view(ViewKind::ShaderResource), None);
        assert_eq!(view_writes(&device), 0);
    }

    #[test]
    fn test_bind_stage_copies_views_into_tables() {
        let (device, context) = table_context();
        let constants = context
            .create_buffer(&BufferDescriptor {
                label: Some("Constants".into()),
                stride: 256,
                element_count: 1,
                flags: ResourceFlags::GPU_READ,
                buffer_type: BufferType::Constant,
                ..Default::default()
            })
            .unwrap();
        let albedo: Arc<dyn GpuResource> = context
            .create_texture(&TextureDescriptor {
                label: Some("Albedo".into()),
                width: 4,
                height: 4,
                ..Default::default()
            })
            .unwrap();
        let linear = context.create_sampler("Linear", SamplerDescriptor::default());
        let baked = context.create_sampler(
            "Baked",
            SamplerDescriptor {
                immutable: true,
                ..Default::default()
            },
        );

        let mut stage = StageBindings::default();
        stage.constant_buffers.set(0, Some(&constants));
        stage.shader_resources.set(1, Some(&albedo));
        stage.samplers.set(0, Some(&baked));
        stage.samplers.set(1, Some(&linear));
        let shader = StageLayout {
            constant_buffers: 1,
            shader_resources: 2,
            unordered_access: 0,
            samplers: 2,
        };

        context.begin_frame();
        let mut recorder = device.recorder("draw");
        let tables = context
            .bind_stage(&stage, &shader, &mut recorder)
            .unwrap()
            .unwrap();

        // Binding realized everything, so the views exist now.
        let cbv = constants.core().view(ViewKind::ConstantBuffer).unwrap();
        let srv = albedo.core().view(ViewKind::ShaderResource).unwrap();
        let sampler = linear.view().unwrap();
        assert!(baked.view().is_none());
        assert_eq!(
            stage.table_layout(&shader),
            TableLayout {
                resources: vec![Some(cbv), None, Some(srv)],
                samplers: vec![SamplerEntry::Immutable, SamplerEntry::Heap(Some(sampler))],
            }
        );

        let journal = device.journal();
        let copied: Vec<_> = journal
            .iter()
            .filter_map(|entry| match entry {
                Recorded::CopyDescriptors { source, kind, .. } => Some((*source, *kind)),
                _ => None,
            })
            .collect();
        assert_eq!(
            copied,
            vec![
                (cbv, DescriptorHeapKind::Resource),
                (srv, DescriptorHeapKind::Resource),
                (sampler, DescriptorHeapKind::Sampler),
            ]
        );
        assert!(journal.contains(&Recorded::SetTable {
            root_index: 0,
            table: tables.resources.unwrap(),
        }));
        assert!(journal.contains(&Recorded::SetTable {
            root_index: 1,
            table: tables.samplers.unwrap(),
        }));
    }

    #[test]
    fn test_bind_stage_on_slot_backend_only_applies() {
        let (device, context) = context();
        let constants = context
            .create_buffer(&BufferDescriptor {
                stride: 64,
                element_count: 1,
                flags: ResourceFlags::GPU_READ,
                buffer_type: BufferType::Constant,
                ..Default::default()
            })
            .unwrap();
        let mut stage = StageBindings::default();
        stage.constant_buffers.set(0, Some(&constants));

        let mut recorder = device.recorder("draw");
        let tables = context
            .bind_stage(&stage, &StageLayout::default(), &mut recorder)
            .unwrap();
        assert!(tables.is_none());
        assert!(constants.native().is_some());
        assert_eq!(constants.core().view(ViewKind::ConstantBuffer), None);
    }

    #[test]
    fn test_settings_are_sanitized() {
        let device = MockGraphicsDevice::new();
        let context = DeviceContext::new(
            device,
            GpuSettings {
                frames_in_flight: 0,
                ..Default::default()
            },
        );
        assert_eq!(context.settings().frames_in_flight, 1);
    }
}
