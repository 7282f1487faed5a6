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

//! GPU resources: buffers with sub-allocation, textures and samplers.
//!
//! Resources are shared (`Arc`) and realized lazily: the native object is
//! created the first time a resource is applied to a command recorder, and
//! re-created when its version changes. Disposal queues the native object for
//! release once every frame that could reference it has retired.

mod buffer;
mod common;
pub mod copy;
mod sampler;
mod texture;

pub use self::buffer::GpuBuffer;
pub use self::copy::SubResourceCopy;
pub use self::common::ResourceCore;
pub use self::sampler::GpuSampler;
pub use self::texture::GpuTexture;

pub(crate) use self::common::{view_kinds, Realization, ViewSource};

use crate::api::{NativeResource, ResourceFlags, ResourceFormat};
use crate::binding::Bindable;
use crate::error::ResourceError;
use crate::traits::CommandRecorder;
use std::fmt::Debug;

/// A borrowed view of a resource's concrete type.
#[derive(Debug, Clone, Copy)]
pub enum ResourceKind<'a> {
    /// A root buffer or a sub-allocation.
    Buffer(&'a GpuBuffer),
    /// A texture.
    Texture(&'a GpuTexture),
}

/// Common interface of buffers and textures.
pub trait GpuResource: Bindable + Debug {
    /// Shared state: label, flags, version and frame tracking.
    fn core(&self) -> &ResourceCore;

    /// The size of the resource in bytes.
    fn size_in_bytes(&self) -> u64;

    /// Ensures the native object exists for the current version and notifies
    /// `recorder` that it is referenced.
    ///
    /// ## Errors
    /// * `ResourceError::Disposed` - If the resource has been disposed.
    /// * `ResourceError::Backend` - If the native object could not be created.
    fn apply(&self, recorder: &mut dyn CommandRecorder) -> Result<(), ResourceError>;

    /// The native object and byte offset the resource lives at, once realized.
    fn native(&self) -> Option<NativeResource>;

    /// Unbinds the resource from every slot and queues its native object for
    /// release. Idempotent.
    fn dispose(&self);

    /// The concrete type of the resource.
    fn kind(&self) -> ResourceKind<'_>;

    /// The resource's debug label.
    fn label(&self) -> &str {
        self.core().label()
    }

    /// The flags the resource was created with.
    fn flags(&self) -> ResourceFlags {
        self.core().flags()
    }

    /// The element format.
    fn format(&self) -> ResourceFormat {
        self.core().format()
    }

    /// The current version.
    fn version(&self) -> u32 {
        self.core().version()
    }

    /// The frame epoch in which the resource was last applied.
    fn last_used_frame(&self) -> u64 {
        self.core().last_used_frame()
    }

    /// The frame epoch in which the resource was last resized.
    fn last_frame_resized(&self) -> u64 {
        self.core().last_frame_resized()
    }

    /// Returns `true` once the resource has been disposed.
    fn is_disposed(&self) -> bool {
        self.core().is_disposed()
    }
}
