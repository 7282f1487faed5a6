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

use super::{Realization, ResourceCore, ViewSource};
use crate::api::*;
use crate::binding::{BindState, Bindable};
use crate::device::DeviceShared;
use crate::error::ResourceError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A sampler state object, realized lazily like the other resources.
pub struct GpuSampler {
    core: ResourceCore,
    descriptor: Mutex<SamplerDescriptor>,
    native: Realization<SamplerId>,
}

impl GpuSampler {
    pub(crate) fn new(
        device: Arc<DeviceShared>,
        label: &str,
        descriptor: SamplerDescriptor,
    ) -> Self {
        Self {
            core: ResourceCore::new(
                device,
                label.to_owned(),
                ResourceFlags::empty(),
                ResourceFormat::Unknown,
            ),
            descriptor: Mutex::new(descriptor),
            native: Realization::new(),
        }
    }

    /// The sampler's debug label.
    pub fn label(&self) -> &str {
        self.core.label()
    }

    /// The current sampling state.
    pub fn descriptor(&self) -> SamplerDescriptor {
        *self.descriptor.lock()
    }

    /// The current version, bumped by every effective [`update`](Self::update).
    pub fn version(&self) -> u32 {
        self.core.version()
    }

    /// Returns `true` once the sampler has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Replaces the sampling state. The native object is re-created on the
    /// next [`apply`](Self::apply).
    ///
    /// ## Returns
    /// `false` if the state did not change.
    pub fn update(&self, descriptor: SamplerDescriptor) -> bool {
        let mut current = self.descriptor.lock();
        if *current == descriptor {
            return false;
        }
        *current = descriptor;
        drop(current);
        self.core.bind_state().bump_version();
        true
    }

    /// Returns the native sampler, creating it for the current state if needed.
    ///
    /// On table-binding devices the sampler is also written into a sampler
    /// heap descriptor, unless it is immutable.
    ///
    /// ## Errors
    /// * `ResourceError::Disposed` - If the sampler has been disposed.
    /// * `ResourceError::Backend` - If the native object could not be created.
    /// * `ResourceError::Descriptor` - If no sampler descriptor could be allocated.
    pub fn apply(&self) -> Result<SamplerId, ResourceError> {
        self.core.ensure_live()?;
        self.core.touch();
        let descriptor = self.descriptor();
        let id = self
            .core
            .realize(&self.native, 0, NativeHandle::Sampler, |device| {
                device.create_sampler(&descriptor)
            })?;
        if descriptor.immutable {
            self.core.release_views();
        } else {
            self.core.write_views(ViewSource::Sampler(id), &[])?;
        }
        Ok(id)
    }

    /// The sampler heap descriptor written by the last [`apply`](Self::apply).
    pub fn view(&self) -> Option<CpuDescriptor> {
        self.core.sampler_view()
    }

    /// The native sampler, once realized.
    pub fn native(&self) -> Option<SamplerId> {
        self.native.handle()
    }

    /// Unbinds the sampler from every slot and queues its native object for release.
    pub fn dispose(&self) {
        if !self.core.begin_dispose() {
            return;
        }
        self.core.bind_state().unbind_all();
        self.core.release_views();
        self.core.release(&self.native, NativeHandle::Sampler);
    }
}

impl Bindable for GpuSampler {
    fn bind_state(&self) -> &BindState {
        self.core.bind_state()
    }
}

impl Drop for GpuSampler {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for GpuSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuSampler")
            .field("label", &self.label())
            .field("descriptor", &self.descriptor())
            .field("version", &self.version())
            .finish()
    }
}
