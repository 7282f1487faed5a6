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

//! A journaling mock backend shared by the unit tests.

use crate::api::*;
use crate::error::BackendError;
use crate::traits::{CommandRecorder, GraphicsDevice};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Distance between two descriptors in every mock heap.
pub(crate) const DESCRIPTOR_INCREMENT: u32 = 32;

/// Routes `log` output to the test harness. Safe to call from every test.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Everything the mock backend was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recorded {
    CreateBuffer(BufferId),
    CreateTexture(TextureId),
    CreateSampler(SamplerId),
    CreateHeap {
        id: DescriptorHeapId,
        kind: DescriptorHeapKind,
        capacity: u32,
    },
    CreateRecorder(String),
    Release(NativeHandle),
    Submit {
        label: String,
        epoch: u64,
    },
    CopyDescriptors {
        count: u32,
        destination: CpuDescriptor,
        source: CpuDescriptor,
        kind: DescriptorHeapKind,
    },
    Begin(String),
    End(String),
    BeginEvent(String),
    EndEvent,
    Reference(NativeResource),
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        len: usize,
    },
    ReadBuffer {
        buffer: BufferId,
        offset: u64,
        len: usize,
    },
    CopyBuffer {
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    },
    CopyTexture {
        source: TextureId,
        destination: TextureId,
    },
    CopyBufferToTexture {
        source: BufferId,
        source_offset: u64,
        destination: TextureId,
    },
    CopySubresource {
        source: TextureId,
        source_subresource: u32,
        source_region: Option<ResourceRegion>,
        destination: TextureId,
        destination_subresource: u32,
        destination_origin: [u32; 3],
    },
    ClearTexture(TextureId, ClearValue),
    Dispatch(ComputeShaderId, [u32; 3]),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    SetHeaps(Vec<DescriptorHeapId>),
    SetTable {
        root_index: u32,
        table: GpuDescriptor,
    },
    WriteView {
        kind: ViewKind,
        resource: NativeResource,
        destination: CpuDescriptor,
    },
    WriteSampler {
        sampler: SamplerId,
        destination: CpuDescriptor,
    },
}

/// State shared by a mock device and the recorders it hands out.
#[derive(Debug)]
struct MockState {
    journal: Mutex<Vec<Recorded>>,
    memory: Mutex<FxHashMap<BufferId, Vec<u8>>>,
    released: Mutex<Vec<NativeHandle>>,
    next_id: AtomicU64,
    fail: AtomicBool,
}

impl MockState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            journal: Mutex::new(Vec::new()),
            memory: Mutex::new(FxHashMap::default()),
            released: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail: AtomicBool::new(false),
        })
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, command: Recorded) {
        self.journal.lock().push(command);
    }

    fn check(&self, operation: &str) -> Result<(), BackendError> {
        if self.fail.load(Ordering::Relaxed) {
            Err(BackendError::new(format!("{operation} failed (injected)")))
        } else {
            Ok(())
        }
    }
}

/// A [`GraphicsDevice`] that hands out unique ids, keeps buffer contents in
/// memory and journals every call.
#[derive(Debug)]
pub(crate) struct MockGraphicsDevice {
    state: Arc<MockState>,
    completed: AtomicU64,
    binding_model: BindingModel,
    missing: Option<(ResourceFormat, FormatSupport)>,
}

impl MockGraphicsDevice {
    fn build(
        binding_model: BindingModel,
        missing: Option<(ResourceFormat, FormatSupport)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: MockState::new(),
            completed: AtomicU64::new(0),
            binding_model,
            missing,
        })
    }

    /// A slot-model device supporting every format.
    pub(crate) fn new() -> Arc<Self> {
        Self::build(BindingModel::Slots, None)
    }

    /// A device that binds through descriptor tables.
    pub(crate) fn with_tables() -> Arc<Self> {
        Self::build(BindingModel::DescriptorTables, None)
    }

    /// A device that lacks `support` for `format`.
    pub(crate) fn without_format(format: ResourceFormat, support: FormatSupport) -> Arc<Self> {
        Self::build(BindingModel::Slots, Some((format, support)))
    }

    /// A recorder sharing this device's journal and memory.
    pub(crate) fn recorder(&self, label: &str) -> MockRecorder {
        MockRecorder {
            label: label.to_owned(),
            state: self.state.clone(),
        }
    }

    pub(crate) fn journal(&self) -> Vec<Recorded> {
        self.state.journal.lock().clone()
    }

    pub(crate) fn released(&self) -> Vec<NativeHandle> {
        self.state.released.lock().clone()
    }

    /// Pretends the GPU finished every submission up to `epoch`.
    pub(crate) fn set_completed_epoch(&self, epoch: u64) {
        self.completed.store(epoch, Ordering::Release);
    }

    /// Makes every fallible call fail until switched off again.
    pub(crate) fn fail_backend(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::Relaxed);
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor<'_>) -> Result<BufferId, BackendError> {
        self.state.check("create_buffer")?;
        let id = BufferId(self.state.next());
        self.state
            .memory
            .lock()
            .insert(id, vec![0; descriptor.size() as usize]);
        self.state.record(Recorded::CreateBuffer(id));
        Ok(id)
    }

    fn create_texture(
        &self,
        _descriptor: &TextureDescriptor<'_>,
    ) -> Result<TextureId, BackendError> {
        self.state.check("create_texture")?;
        let id = TextureId(self.state.next());
        self.state.record(Recorded::CreateTexture(id));
        Ok(id)
    }

    fn create_sampler(&self, _descriptor: &SamplerDescriptor) -> Result<SamplerId, BackendError> {
        self.state.check("create_sampler")?;
        let id = SamplerId(self.state.next());
        self.state.record(Recorded::CreateSampler(id));
        Ok(id)
    }

    fn release(&self, handle: NativeHandle) -> Result<(), BackendError> {
        if let NativeHandle::Buffer(id) = handle {
            self.state.memory.lock().remove(&id);
        }
        self.state.released.lock().push(handle);
        self.state.record(Recorded::Release(handle));
        Ok(())
    }

    fn create_command_recorder(
        &self,
        label: &str,
    ) -> Result<Box<dyn CommandRecorder>, BackendError> {
        self.state.check("create_command_recorder")?;
        self.state.record(Recorded::CreateRecorder(label.to_owned()));
        Ok(Box::new(self.recorder(label)))
    }

    fn submit(&self, recorder: &mut dyn CommandRecorder, epoch: u64) -> Result<(), BackendError> {
        self.state.check("submit")?;
        self.state.record(Recorded::Submit {
            label: recorder.label().to_owned(),
            epoch,
        });
        Ok(())
    }

    fn completed_epoch(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    fn format_support(&self, format: ResourceFormat) -> FormatSupport {
        match self.missing {
            Some((missing, support)) if missing == format => FormatSupport::all() - support,
            _ => FormatSupport::all(),
        }
    }

    fn binding_model(&self) -> BindingModel {
        self.binding_model
    }

    fn create_descriptor_heap(
        &self,
        descriptor: &DescriptorHeapDescriptor<'_>,
    ) -> Result<NativeDescriptorHeap, BackendError> {
        self.state.check("create_descriptor_heap")?;
        let id = DescriptorHeapId(self.state.next());
        self.state.record(Recorded::CreateHeap {
            id,
            kind: descriptor.kind,
            capacity: descriptor.capacity,
        });
        Ok(NativeDescriptorHeap {
            id,
            cpu_start: CpuDescriptor(id.0 * 1_000_000),
            gpu_start: descriptor
                .gpu_visible
                .then_some(GpuDescriptor(id.0 * 1_000_000)),
            increment: DESCRIPTOR_INCREMENT,
        })
    }

    fn copy_descriptors(
        &self,
        count: u32,
        destination: CpuDescriptor,
        source: CpuDescriptor,
        kind: DescriptorHeapKind,
    ) {
        self.state.record(Recorded::CopyDescriptors {
            count,
            destination,
            source,
            kind,
        });
    }

    fn write_view_descriptor(&self, view: &ViewDescriptor, destination: CpuDescriptor) {
        self.state.record(Recorded::WriteView {
            kind: view.kind,
            resource: view.resource,
            destination,
        });
    }

    fn write_sampler_descriptor(&self, sampler: SamplerId, destination: CpuDescriptor) {
        self.state.record(Recorded::WriteSampler {
            sampler,
            destination,
        });
    }
}

/// A [`CommandRecorder`] that executes buffer commands against the mock
/// memory and journals everything else.
#[derive(Debug)]
pub(crate) struct MockRecorder {
    label: String,
    state: Arc<MockState>,
}

impl MockRecorder {
    /// A recorder with its own journal and memory, not tied to a device.
    pub(crate) fn detached(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            state: MockState::new(),
        }
    }

    fn range(
        memory: &FxHashMap<BufferId, Vec<u8>>,
        buffer: BufferId,
        offset: u64,
        len: usize,
    ) -> Result<Range<usize>, BackendError> {
        let size = memory
            .get(&buffer)
            .map(Vec::len)
            .ok_or_else(|| BackendError::new(format!("unknown buffer {buffer:?}")))?;
        let start = offset as usize;
        if start + len > size {
            return Err(BackendError::new(format!(
                "{buffer:?}: range {start}..{} exceeds {size} bytes",
                start + len
            )));
        }
        Ok(start..start + len)
    }
}

impl CommandRecorder for MockRecorder {
    fn label(&self) -> &str {
        &self.label
    }

    fn begin(&mut self) -> Result<(), BackendError> {
        self.state.check("begin")?;
        self.state.record(Recorded::Begin(self.label.clone()));
        Ok(())
    }

    fn end(&mut self) -> Result<(), BackendError> {
        self.state.check("end")?;
        self.state.record(Recorded::End(self.label.clone()));
        Ok(())
    }

    fn begin_event(&mut self, label: &str) {
        self.state.record(Recorded::BeginEvent(label.to_owned()));
    }

    fn end_event(&mut self) {
        self.state.record(Recorded::EndEvent);
    }

    fn reference(&mut self, resource: NativeResource) {
        self.state.record(Recorded::Reference(resource));
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.state.check("write_buffer")?;
        let mut memory = self.state.memory.lock();
        let range = Self::range(&memory, buffer, offset, data.len())?;
        if let Some(contents) = memory.get_mut(&buffer) {
            contents[range].copy_from_slice(data);
        }
        drop(memory);
        self.state.record(Recorded::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn read_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        destination: &mut [u8],
    ) -> Result<(), BackendError> {
        self.state.check("read_buffer")?;
        let memory = self.state.memory.lock();
        let range = Self::range(&memory, buffer, offset, destination.len())?;
        if let Some(contents) = memory.get(&buffer) {
            destination.copy_from_slice(&contents[range]);
        }
        drop(memory);
        self.state.record(Recorded::ReadBuffer {
            buffer,
            offset,
            len: destination.len(),
        });
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), BackendError> {
        self.state.check("copy_buffer")?;
        let mut memory = self.state.memory.lock();
        let from = Self::range(&memory, source, source_offset, size as usize)?;
        let to = Self::range(&memory, destination, destination_offset, size as usize)?;
        let bytes = memory
            .get(&source)
            .map(|contents| contents[from].to_vec())
            .unwrap_or_default();
        if let Some(contents) = memory.get_mut(&destination) {
            contents[to].copy_from_slice(&bytes);
        }
        drop(memory);
        self.state.record(Recorded::CopyBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
        Ok(())
    }

    fn copy_texture(
        &mut self,
        source: TextureId,
        destination: TextureId,
    ) -> Result<(), BackendError> {
        self.state.check("copy_texture")?;
        self.state.record(Recorded::CopyTexture {
            source,
            destination,
        });
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: TextureId,
    ) -> Result<(), BackendError> {
        self.state.check("copy_buffer_to_texture")?;
        self.state.record(Recorded::CopyBufferToTexture {
            source,
            source_offset,
            destination,
        });
        Ok(())
    }

    fn copy_subresource(
        &mut self,
        source: TextureId,
        source_subresource: u32,
        source_region: Option<ResourceRegion>,
        destination: TextureId,
        destination_subresource: u32,
        destination_origin: [u32; 3],
    ) -> Result<(), BackendError> {
        self.state.check("copy_subresource")?;
        self.state.record(Recorded::CopySubresource {
            source,
            source_subresource,
            source_region,
            destination,
            destination_subresource,
            destination_origin,
        });
        Ok(())
    }

    fn clear_texture(&mut self, texture: TextureId, value: ClearValue) -> Result<(), BackendError> {
        self.state.check("clear_texture")?;
        self.state.record(Recorded::ClearTexture(texture, value));
        Ok(())
    }

    fn dispatch(&mut self, shader: ComputeShaderId, groups: [u32; 3]) -> Result<(), BackendError> {
        self.state.check("dispatch")?;
        self.state.record(Recorded::Dispatch(shader, groups));
        Ok(())
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.state.record(Recorded::Draw {
            vertices,
            instances,
        });
    }

    fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeapId]) {
        self.state.record(Recorded::SetHeaps(heaps.to_vec()));
    }

    fn set_descriptor_table(&mut self, root_index: u32, table: GpuDescriptor) {
        self.state.record(Recorded::SetTable { root_index, table });
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
