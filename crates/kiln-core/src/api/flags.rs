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

//! Capability flags for resources and formats.

use crate::error::ResourceError;
use bitflags::bitflags;

bitflags! {
    /// Describes how a GPU resource may be accessed by the CPU, the GPU and shaders.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        /// The CPU can write to the resource (staging uploads).
        const UPLOAD_MEMORY = 1 << 0;
        /// The CPU can read the resource back.
        const DOWNLOAD_MEMORY = 1 << 1;
        /// The GPU can read the resource, e.g. as a copy source.
        const GPU_READ = 1 << 2;
        /// The GPU can write the resource, e.g. as a copy destination.
        const GPU_WRITE = 1 << 3;
        /// The resource can be bound for unordered (random) shader access.
        const UNORDERED_ACCESS = 1 << 4;
        /// The resource can never be bound to a shader stage.
        const DENY_SHADER_ACCESS = 1 << 5;
        /// The resource may be shared with another device or process.
        const SHARED = 1 << 6;
    }
}

impl ResourceFlags {
    /// Checks the invariants that hold for every resource.
    ///
    /// CPU-writable memory cannot be shader-bound, so `UPLOAD_MEMORY` requires
    /// `DENY_SHADER_ACCESS`. Unordered access is a shader binding and therefore
    /// conflicts with `DENY_SHADER_ACCESS`.
    ///
    /// ## Errors
    /// * `ResourceError::InvalidFlags` - If the combination is not allowed.
    pub fn validate(self) -> Result<(), ResourceError> {
        if self.contains(Self::UPLOAD_MEMORY) && !self.contains(Self::DENY_SHADER_ACCESS) {
            return Err(ResourceError::InvalidFlags {
                flags: self,
                reason: "UPLOAD_MEMORY requires DENY_SHADER_ACCESS",
            });
        }
        if self.contains(Self::UNORDERED_ACCESS | Self::DENY_SHADER_ACCESS) {
            return Err(ResourceError::InvalidFlags {
                flags: self,
                reason: "UNORDERED_ACCESS cannot be combined with DENY_SHADER_ACCESS",
            });
        }
        Ok(())
    }

    /// Returns `true` if the GPU may read the resource.
    pub fn is_gpu_readable(self) -> bool {
        self.contains(Self::GPU_READ)
    }

    /// Returns `true` if the GPU may write the resource.
    pub fn is_gpu_writable(self) -> bool {
        self.intersects(Self::GPU_WRITE | Self::UNORDERED_ACCESS)
    }

    /// Returns `true` if the resource may be bound to shader stages.
    pub fn is_shader_visible(self) -> bool {
        !self.contains(Self::DENY_SHADER_ACCESS)
    }
}

bitflags! {
    /// What a device can do with a given [`ResourceFormat`](crate::api::ResourceFormat).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatSupport: u32 {
        /// The format can be used for buffer elements.
        const BUFFER = 1 << 0;
        /// The format can be used for textures.
        const TEXTURE = 1 << 1;
        /// Textures of this format can be rendered to.
        const RENDER_TARGET = 1 << 2;
        /// Textures of this format can be used as depth/stencil targets.
        const DEPTH_STENCIL = 1 << 3;
        /// The format supports unordered access views.
        const UNORDERED_ACCESS = 1 << 4;
        /// The format can be sampled from shaders.
        const SHADER_SAMPLE = 1 << 5;
    }
}
