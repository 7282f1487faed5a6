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

//! Defines the hierarchy of error types for the GPU core.
//!
//! Usage errors are returned at the call that misused the API. Failures that
//! happen while a deferred task runs never surface here; they are reported as
//! `success = false` through the task's completion callback instead.

use crate::api::{
    DescriptorHeapId, DescriptorHeapKind, FormatSupport, ResourceFlags, ResourceFormat,
};
use thiserror::Error;

/// A failure reported by a native backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Backend error: {0}")]
pub struct BackendError(pub String);

impl BackendError {
    /// Creates a backend error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// The flag combination breaks a resource invariant.
    #[error("Invalid resource flags {flags:?}: {reason}")]
    InvalidFlags {
        /// The rejected flags.
        flags: ResourceFlags,
        /// Which rule was broken.
        reason: &'static str,
    },
    /// The operation needs a flag the resource was not created with.
    #[error("'{label}' lacks {required:?}, which {operation} requires")]
    MissingFlag {
        /// The resource's label.
        label: String,
        /// The operation that was attempted.
        operation: &'static str,
        /// The missing flag.
        required: ResourceFlags,
    },
    /// A byte range does not fit within the resource.
    #[error("Access of {size} bytes at offset {offset} exceeds the {capacity} bytes of '{label}'")]
    OutOfBounds {
        /// The resource's label.
        label: String,
        /// Start of the access in bytes.
        offset: u64,
        /// Length of the access in bytes.
        size: u64,
        /// Size of the resource in bytes.
        capacity: u64,
    },
    /// The device cannot use the format the way the resource requires.
    #[error("Format {format:?} does not support {required:?} on this device")]
    UnsupportedFormat {
        /// The requested format.
        format: ResourceFormat,
        /// The capabilities that are missing.
        required: FormatSupport,
    },
    /// The resource was already disposed.
    #[error("Resource '{0}' has been disposed")]
    Disposed(String),
    /// The root buffer that backs a sub-allocation no longer exists.
    #[error("The root buffer backing '{0}' has been dropped")]
    RootDropped(String),
    /// A view descriptor could not be allocated.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// The native backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A copy request that can never succeed on the GPU.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CopyError {
    /// One side of the copy was disposed.
    #[error("Cannot copy with disposed resource '{0}'")]
    Disposed(String),
    /// The source is not readable by the GPU.
    #[error("Copy source '{0}' is not GPU readable")]
    SourceNotGpuReadable(String),
    /// The destination is not writable by the GPU.
    #[error("Copy destination '{0}' is not GPU writable")]
    DestinationNotGpuWritable(String),
    /// A sub-resource copy source lacks `UPLOAD_MEMORY`.
    #[error("Sub-resource copy source '{0}' lacks UPLOAD_MEMORY")]
    SourceNotUploadable(String),
    /// A sub-resource copy destination lacks `DOWNLOAD_MEMORY`.
    #[error("Sub-resource copy destination '{0}' lacks DOWNLOAD_MEMORY")]
    DestinationNotDownloadable(String),
    /// Texture formats differ.
    #[error("Texture formats differ: {source_format:?} -> {destination_format:?}")]
    FormatMismatch {
        /// Source format.
        source_format: ResourceFormat,
        /// Destination format.
        destination_format: ResourceFormat,
    },
    /// Texture dimensions differ.
    #[error("Texture dimensions differ: {source_extent:?} -> {destination_extent:?}")]
    DimensionMismatch {
        /// Source width, height, depth.
        source_extent: [u32; 3],
        /// Destination width, height, depth.
        destination_extent: [u32; 3],
    },
    /// The destination buffer is smaller than the data copied into it.
    #[error("Destination '{label}' holds {available} bytes but {required} are copied")]
    DestinationTooSmall {
        /// The destination's label.
        label: String,
        /// Bytes written by the copy.
        required: u64,
        /// Bytes available in the destination.
        available: u64,
    },
    /// A mip level index is out of range for its texture.
    #[error("Mip level {level} is out of range for '{label}' ({count} levels)")]
    MipLevelOutOfRange {
        /// The texture's label.
        label: String,
        /// The requested level.
        level: u32,
        /// The texture's mip level count.
        count: u32,
    },
    /// An array slice index is out of range for its texture.
    #[error("Array slice {slice} is out of range for '{label}' ({count} slices)")]
    ArraySliceOutOfRange {
        /// The texture's label.
        label: String,
        /// The requested slice.
        slice: u32,
        /// The texture's array layer count.
        count: u32,
    },
    /// A copy region falls outside of the resource.
    #[error("Copy region is out of bounds for '{0}'")]
    RegionOutOfBounds(String),
    /// The pair of resource kinds cannot be copied.
    #[error("Unsupported copy: {0}")]
    Unsupported(&'static str),
}

/// A misuse of the buffer sub-allocator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    /// `free` was called on a buffer that is not the block's direct parent.
    #[error("'{parent}' is not the parent of '{buffer}'")]
    NotParent {
        /// The buffer `free` was called on.
        parent: String,
        /// The block that was passed in.
        buffer: String,
    },
    /// A root buffer was asked to return itself to a parent.
    #[error("'{0}' is a root buffer and has no parent to free into")]
    NotSubAllocation(String),
    /// The block's parent has been dropped.
    #[error("The parent of '{0}' has been dropped")]
    ParentDropped(String),
    /// The block is already on its parent's free list.
    #[error("'{0}' has already been freed")]
    AlreadyFreed(String),
    /// The block was disposed and can no longer be freed or reused.
    #[error("'{0}' was disposed and cannot be returned to its parent")]
    BlockDisposed(String),
    /// A zero-byte block was requested.
    #[error("Zero-sized allocation requested from '{0}'")]
    ZeroSized(String),
    /// The parent buffer was disposed.
    #[error("Cannot allocate from disposed buffer '{0}'")]
    ParentDisposed(String),
    /// The requested block would be an invalid resource.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// A misuse of the task manager, or a failure while submitting a drained queue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// An `Immediate` task was pushed without an active recorder to run on.
    #[error("Immediate task '{kind}' was pushed without an active command recorder")]
    MissingRecorder {
        /// The task's kind tag.
        kind: &'static str,
    },
    /// Recording or submitting the queue's command list failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// An error raised by the descriptor heap allocator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    /// The request can never fit in one heap page.
    #[error("{kind:?} heap cannot hold {requested} contiguous descriptors (page size {capacity})")]
    HeapExhausted {
        /// The heap kind.
        kind: DescriptorHeapKind,
        /// Descriptors requested.
        requested: u32,
        /// Descriptors per page.
        capacity: u32,
    },
    /// A table was requested from a heap shaders cannot see.
    #[error("{0:?} heap is not GPU visible")]
    NotShaderVisible(DescriptorHeapKind),
    /// Zero descriptors were requested.
    #[error("Cannot allocate zero {0:?} descriptors")]
    ZeroSized(DescriptorHeapKind),
    /// The handle points into a heap the allocator does not own.
    #[error("{kind:?} handle points into unknown heap {heap:?}")]
    UnknownHeap {
        /// The allocator's kind.
        kind: DescriptorHeapKind,
        /// The heap recorded in the handle.
        heap: DescriptorHeapId,
    },
    /// Part of the handle is already free.
    #[error("{kind:?} descriptors at {start} of heap {heap:?} are already free")]
    AlreadyFreed {
        /// The allocator's kind.
        kind: DescriptorHeapKind,
        /// The heap holding the range.
        heap: DescriptorHeapId,
        /// First descriptor of the range.
        start: u32,
    },
    /// The handle was allocated from another allocator.
    #[error("Handle of a {found:?} heap returned to the {expected:?} allocator")]
    ForeignHandle {
        /// The allocator's kind.
        expected: DescriptorHeapKind,
        /// The handle's kind.
        found: DescriptorHeapKind,
    },
    /// The native backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Any error produced by this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpuError {
    /// See [`ResourceError`].
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// See [`CopyError`].
    #[error(transparent)]
    Copy(#[from] CopyError),
    /// See [`AllocationError`].
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// See [`TaskError`].
    #[error(transparent)]
    Task(#[from] TaskError),
    /// See [`DescriptorError`].
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// See [`BackendError`].
    #[error(transparent)]
    Backend(#[from] BackendError),
}
