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

//! Opaque handles to native objects and core-side object identities.

use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque handle to a native GPU buffer owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// An opaque handle to a native GPU texture owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// An opaque handle to a native sampler state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub u64);

/// An opaque handle to a compiled compute shader, provided by the shader collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeShaderId(pub u64);

/// An opaque handle to a native descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHeapId(pub u64);

/// The CPU-side address of a descriptor inside a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuDescriptor(pub u64);

impl CpuDescriptor {
    /// Returns the address `index` descriptors further into the heap.
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + u64::from(index) * u64::from(increment))
    }
}

/// The GPU-side address of a descriptor inside a shader-visible heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuDescriptor(pub u64);

impl GpuDescriptor {
    /// Returns the address `index` descriptors further into the heap.
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + u64::from(index) * u64::from(increment))
    }
}

/// Any native object the core may hand back to the backend for release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeHandle {
    /// A native buffer allocation.
    Buffer(BufferId),
    /// A native texture allocation.
    Texture(TextureId),
    /// A native sampler state object.
    Sampler(SamplerId),
    /// A native descriptor heap.
    DescriptorHeap(DescriptorHeapId),
}

/// Where a realized resource lives natively.
///
/// Sub-allocated buffers share their root's [`BufferId`] and differ only by offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeResource {
    /// A byte range start inside a native buffer.
    Buffer {
        /// The native buffer backing the resource.
        id: BufferId,
        /// The byte offset of the resource within that buffer.
        offset: u64,
    },
    /// A native texture.
    Texture(TextureId),
}

/// A process-unique identity for bindable core objects.
///
/// Binding slots compare identities rather than pointers so a recycled allocation
/// can never be mistaken for the object that previously lived at the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}
