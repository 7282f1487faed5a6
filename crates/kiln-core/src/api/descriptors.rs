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

//! Descriptors passed to the backend when native objects are created, plus the
//! small value types used by recorded commands.

use super::{
    CpuDescriptor, DescriptorHeapId, GpuDescriptor, NativeResource, ResourceFlags, ResourceFormat,
};
use std::borrow::Cow;

/// The intended use of a buffer. Backends use it to pick memory and bind flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferType {
    /// No particular use.
    #[default]
    Unknown,
    /// Vertex data.
    Vertex,
    /// Index data.
    Index,
    /// Raw, byte-addressed shader data.
    ByteAddress,
    /// Structured shader data with a fixed element stride.
    Structured,
    /// CPU-visible staging memory.
    Staging,
    /// Shader constants.
    Constant,
}

/// Describes a buffer to be created.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// The size of one element in bytes.
    pub stride: u32,
    /// The number of elements.
    pub element_count: u32,
    /// Access flags.
    pub flags: ResourceFlags,
    /// The intended use of the buffer.
    pub buffer_type: BufferType,
    /// The alignment sub-allocations are placed at. `0` is treated as `1`.
    pub alignment: u32,
}

impl BufferDescriptor<'_> {
    /// The total size in bytes (`stride * element_count`).
    pub fn size(&self) -> u64 {
        u64::from(self.stride) * u64::from(self.element_count)
    }
}

impl Default for BufferDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            stride: 1,
            element_count: 0,
            flags: ResourceFlags::GPU_READ | ResourceFlags::GPU_WRITE,
            buffer_type: BufferType::Unknown,
            alignment: 1,
        }
    }
}

/// Describes a texture to be created.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels (1 for 2D textures).
    pub depth: u32,
    /// The number of mip levels.
    pub mip_levels: u32,
    /// The number of array layers.
    pub array_layers: u32,
    /// Texel format.
    pub format: ResourceFormat,
    /// Access flags.
    pub flags: ResourceFlags,
}

impl Default for TextureDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: ResourceFormat::Rgba8Unorm,
            flags: ResourceFlags::GPU_READ | ResourceFlags::GPU_WRITE,
        }
    }
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Linear interpolation.
    #[default]
    Linear,
}

/// Texture addressing mode outside of `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Wrap around.
    #[default]
    Repeat,
    /// Wrap around, mirrored.
    MirrorRepeat,
    /// Clamp to the edge texel.
    ClampToEdge,
}

/// Describes sampler state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerDescriptor {
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Filter between mip levels.
    pub mip_filter: FilterMode,
    /// Addressing along U.
    pub address_u: AddressMode,
    /// Addressing along V.
    pub address_v: AddressMode,
    /// Addressing along W.
    pub address_w: AddressMode,
    /// Maximum anisotropy, `0` or `1` disables anisotropic filtering.
    pub max_anisotropy: u8,
    /// Baked into the pipeline. An immutable sampler takes no descriptor and
    /// no sampler table slot.
    pub immutable: bool,
}

/// The ways a resource can be viewed by a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// A constant buffer view.
    ConstantBuffer,
    /// A read-only shader resource view.
    ShaderResource,
    /// A read-write unordered access view.
    UnorderedAccess,
}

/// A view the backend writes into a CPU descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDescriptor {
    /// How the shader sees the resource.
    pub kind: ViewKind,
    /// The native object and byte offset being viewed.
    pub resource: NativeResource,
    /// Bytes covered by the view, starting at the resource's offset.
    pub size: u64,
    /// The element format. `Unknown` for raw and structured buffers.
    pub format: ResourceFormat,
}

/// Hard limits reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// The maximum number of thread groups along X or Y in a single dispatch.
    pub max_dispatch_groups_xy: u32,
    /// The maximum number of thread groups along Z in a single dispatch.
    pub max_dispatch_groups_z: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_dispatch_groups_xy: 65_535,
            max_dispatch_groups_z: 65_535,
        }
    }
}

/// How a device expects shader resources to be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingModel {
    /// Resources are bound to individual slots per stage.
    #[default]
    Slots,
    /// Resources are bound through descriptor tables living in GPU-visible heaps.
    DescriptorTables,
}

/// The value a texture is cleared to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// An RGBA color.
    Color([f32; 4]),
    /// A depth and stencil value.
    DepthStencil {
        /// Depth value.
        depth: f32,
        /// Stencil value.
        stencil: u8,
    },
}

/// A box inside one texture sub-resource, in texels. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceRegion {
    /// Inclusive start corner (x, y, z).
    pub start: [u32; 3],
    /// Exclusive end corner (x, y, z).
    pub end: [u32; 3],
}

impl ResourceRegion {
    /// Returns the extent of the region along each axis.
    pub fn extent(&self) -> [u32; 3] {
        [
            self.end[0].saturating_sub(self.start[0]),
            self.end[1].saturating_sub(self.start[1]),
            self.end[2].saturating_sub(self.start[2]),
        ]
    }

    /// Returns `true` if the region covers no texel.
    pub fn is_empty(&self) -> bool {
        self.extent().iter().any(|&e| e == 0)
    }
}

/// The category of descriptors a heap holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Constant buffer, shader resource and unordered access views.
    Resource,
    /// Sampler states.
    Sampler,
    /// Render target views.
    RenderTarget,
    /// Depth/stencil views.
    DepthStencil,
}

/// Describes a descriptor heap to be created.
#[derive(Debug, Clone)]
pub struct DescriptorHeapDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// What the heap holds.
    pub kind: DescriptorHeapKind,
    /// The number of descriptors.
    pub capacity: u32,
    /// Whether shaders can read descriptors straight from the heap.
    pub gpu_visible: bool,
}

/// A native descriptor heap as returned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeDescriptorHeap {
    /// The heap's handle.
    pub id: DescriptorHeapId,
    /// CPU address of the first descriptor.
    pub cpu_start: CpuDescriptor,
    /// GPU address of the first descriptor, only for GPU-visible heaps.
    pub gpu_start: Option<GpuDescriptor>,
    /// The distance in bytes between two consecutive descriptors.
    pub increment: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_descriptor_size() {
        let desc = BufferDescriptor {
            stride: 16,
            element_count: 32,
            ..Default::default()
        };
        assert_eq!(desc.size(), 512);
    }

    #[test]
    fn test_region_extent() {
        let region = ResourceRegion {
            start: [2, 4, 0],
            end: [10, 8, 1],
        };
        assert_eq!(region.extent(), [8, 4, 1]);
        assert!(!region.is_empty());

        let empty = ResourceRegion {
            start: [4, 0, 0],
            end: [4, 8, 1],
        };
        assert!(empty.is_empty());
    }
}
