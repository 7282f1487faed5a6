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

use super::group::SlotGroup;
use crate::api::ViewKind;
use crate::descriptor::{SamplerEntry, TableLayout};
use crate::error::ResourceError;
use crate::resource::{GpuBuffer, GpuResource, GpuSampler};
use crate::stats::GpuStats;
use crate::traits::CommandRecorder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Slot counts of one shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageLayout {
    /// Constant buffer slots.
    pub constant_buffers: usize,
    /// Shader resource slots.
    pub shader_resources: usize,
    /// Unordered-access slots.
    pub unordered_access: usize,
    /// Sampler slots.
    pub samplers: usize,
}

impl Default for StageLayout {
    fn default() -> Self {
        Self {
            constant_buffers: 14,
            shader_resources: 128,
            unordered_access: 8,
            samplers: 16,
        }
    }
}

/// Backend entry points for slot-model stage binding.
///
/// Every method receives the changed range of one group, starting at slot
/// `first`. `None` entries unbind their slot.
pub trait StageBindTarget {
    /// Binds constant buffers.
    fn bind_constant_buffers(&mut self, first: u32, buffers: &[Option<Arc<GpuBuffer>>]);
    /// Binds read-only shader resources.
    fn bind_shader_resources(&mut self, first: u32, resources: &[Option<Arc<dyn GpuResource>>]);
    /// Binds unordered-access resources.
    fn bind_unordered_access(&mut self, first: u32, resources: &[Option<Arc<dyn GpuResource>>]);
    /// Binds sampler states.
    fn bind_samplers(&mut self, first: u32, samplers: &[Option<Arc<GpuSampler>>]);
}

/// All binding slots of one shader stage.
#[derive(Debug)]
pub struct StageBindings {
    /// Constant buffer slots.
    pub constant_buffers: SlotGroup<GpuBuffer>,
    /// Read-only shader resource slots.
    pub shader_resources: SlotGroup<dyn GpuResource>,
    /// Unordered-access slots.
    pub unordered_access: SlotGroup<dyn GpuResource>,
    /// Sampler slots.
    pub samplers: SlotGroup<GpuSampler>,
    stats: Option<Arc<GpuStats>>,
}

impl StageBindings {
    /// Creates empty slot groups sized by `layout`.
    pub fn new(layout: StageLayout) -> Self {
        Self {
            constant_buffers: SlotGroup::new(layout.constant_buffers),
            shader_resources: SlotGroup::new(layout.shader_resources),
            unordered_access: SlotGroup::new(layout.unordered_access),
            samplers: SlotGroup::new(layout.samplers),
            stats: None,
        }
    }

    /// Records issued and skipped group binds in `stats`.
    pub fn with_stats(mut self, stats: Arc<GpuStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Flushes every group to `target`, one call per group with changes.
    ///
    /// ## Returns
    /// The number of backend calls issued.
    pub fn bind(&mut self, target: &mut dyn StageBindTarget) -> usize {
        let constant_buffers = self
            .constant_buffers
            .bind(&mut |first: u32, values: &[Option<Arc<GpuBuffer>>]| {
                target.bind_constant_buffers(first, values)
            });
        let shader_resources = self
            .shader_resources
            .bind(&mut |first: u32, values: &[Option<Arc<dyn GpuResource>>]| {
                target.bind_shader_resources(first, values)
            });
        let unordered_access = self
            .unordered_access
            .bind(&mut |first: u32, values: &[Option<Arc<dyn GpuResource>>]| {
                target.bind_unordered_access(first, values)
            });
        let samplers = self
            .samplers
            .bind(&mut |first: u32, values: &[Option<Arc<GpuSampler>>]| {
                target.bind_samplers(first, values)
            });
        let issued = [constant_buffers, shader_resources, unordered_access, samplers];

        if let Some(stats) = &self.stats {
            for group in issued {
                stats.record_bind(group);
            }
        }
        issued.into_iter().filter(|group| *group).count()
    }

    /// Applies every object staged within the ranges `shader` declares, so
    /// each one has a native object and, on table-binding devices, its views.
    ///
    /// ## Errors
    /// * `ResourceError` - From the first object that fails to apply.
    pub fn apply_resources(
        &self,
        shader: &StageLayout,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<(), ResourceError> {
        let constant_buffers =
            (0..shader.constant_buffers).filter_map(|i| self.constant_buffers.value(i));
        for buffer in constant_buffers {
            buffer.apply(recorder)?;
        }
        let shader_resources =
            (0..shader.shader_resources).filter_map(|i| self.shader_resources.value(i));
        let unordered_access =
            (0..shader.unordered_access).filter_map(|i| self.unordered_access.value(i));
        for resource in shader_resources.chain(unordered_access) {
            resource.apply(recorder)?;
        }
        for sampler in (0..shader.samplers).filter_map(|i| self.samplers.value(i)) {
            sampler.apply()?;
        }
        Ok(())
    }

    /// Builds the descriptor tables `shader` reads.
    ///
    /// The resource table holds the shader's constant buffer slots, then its
    /// shader resource slots, then its unordered-access slots. Empty slots
    /// and objects without a view of the right kind leave holes. Immutable
    /// samplers take no sampler table slot.
    pub fn table_layout(&self, shader: &StageLayout) -> TableLayout {
        let constant_buffers = (0..shader.constant_buffers).map(|i| {
            self.constant_buffers
                .value(i)
                .and_then(|buffer| buffer.core().view(ViewKind::ConstantBuffer))
        });
        let shader_resources = (0..shader.shader_resources).map(|i| {
            self.shader_resources
                .value(i)
                .and_then(|resource| resource.core().view(ViewKind::ShaderResource))
        });
        let unordered_access = (0..shader.unordered_access).map(|i| {
            self.unordered_access
                .value(i)
                .and_then(|resource| resource.core().view(ViewKind::UnorderedAccess))
        });
        let samplers = (0..shader.samplers)
            .map(|i| match self.samplers.value(i) {
                Some(sampler) if sampler.descriptor().immutable => SamplerEntry::Immutable,
                Some(sampler) => SamplerEntry::Heap(sampler.view()),
                None => SamplerEntry::Heap(None),
            })
            .collect();

        TableLayout {
            resources: constant_buffers
                .chain(shader_resources)
                .chain(unordered_access)
                .collect(),
            samplers,
        }
    }

    /// Stages `None` in every slot of every group.
    pub fn clear(&mut self) {
        self.constant_buffers.clear();
        self.shader_resources.clear();
        self.unordered_access.clear();
        self.samplers.clear();
    }
}

impl Default for StageBindings {
    fn default() -> Self {
        Self::new(StageLayout::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::*;
    use crate::settings::GpuSettings;
    use crate::test_support::MockGraphicsDevice;
    use crate::DeviceContext;

    #[derive(Default)]
    struct Target {
        calls: Vec<(&'static str, u32, usize)>,
    }

    impl StageBindTarget for Target {
        fn bind_constant_buffers(&mut self, first: u32, buffers: &[Option<Arc<GpuBuffer>>]) {
            self.calls.push(("cb", first, buffers.len()));
        }

        fn bind_shader_resources(
            &mut self,
            first: u32,
            resources: &[Option<Arc<dyn GpuResource>>],
        ) {
            self.calls.push(("srv", first, resources.len()));
        }

        fn bind_unordered_access(
            &mut self,
            first: u32,
            resources: &[Option<Arc<dyn GpuResource>>],
        ) {
            self.calls.push(("uav", first, resources.len()));
        }

        fn bind_samplers(&mut self, first: u32, samplers: &[Option<Arc<GpuSampler>>]) {
            self.calls.push(("sampler", first, samplers.len()));
        }
    }

    #[test]
    fn test_default_layout() {
        let stage = StageBindings::default();
        assert_eq!(stage.constant_buffers.len(), 14);
        assert_eq!(stage.shader_resources.len(), 128);
        assert_eq!(stage.unordered_access.len(), 8);
        assert_eq!(stage.samplers.len(), 16);
    }

    #[test]
    fn test_only_changed_groups_are_flushed() {
        let device = MockGraphicsDevice::new();
        let context = DeviceContext::new(device, GpuSettings::default());
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
        let sampler = context.create_sampler("Point", SamplerDescriptor::default());

        let mut stage = StageBindings::default().with_stats(context.stats_handle());
        let mut target = Target::default();
        stage.constant_buffers.set(0, Some(&constants));
        stage.samplers.set(3, Some(&sampler));
        assert_eq!(stage.bind(&mut target), 2);
        assert_eq!(stage.bind(&mut target), 0);
        assert_eq!(target.calls, vec![("cb", 0, 1), ("sampler", 3, 1)]);

        let snapshot = context.stats().snapshot();
        assert_eq!(snapshot.bind_calls, 2);
        assert_eq!(snapshot.bind_calls_skipped, 6);
    }
}
