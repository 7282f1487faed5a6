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

//! # Kiln Core
//!
//! Backend-agnostic GPU command and resource core.
//!
//! The crate lets callers enqueue GPU work (uploads, downloads, copies, clears,
//! compute dispatches) without blocking on its completion, and lets a draw loop
//! bind buffers, textures and samplers while skipping redundant driver calls.
//!
//! Native backends are external collaborators: they implement the contracts in
//! [`traits`] and everything else in this crate is written against them.

#![warn(missing_docs)]

pub mod api;
pub mod binding;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod resource;
pub mod settings;
pub mod stats;
pub mod task;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::*;
pub use binding::{BindState, Bindable, BindingSlot, SlotGroup, StageBindings, StageLayout};
pub use descriptor::DescriptorHeapManager;
pub use device::DeviceContext;
pub use error::{
    AllocationError, BackendError, CopyError, DescriptorError, GpuError, ResourceError, TaskError,
};
pub use frame::FrameBuffered;
pub use resource::{GpuBuffer, GpuResource, GpuSampler, GpuTexture};
pub use settings::GpuSettings;
pub use stats::{GpuStats, GpuStatsSnapshot};
pub use task::{DispatchBindings, GpuPriority, GpuTask, Pooled, TaskManager};
pub use traits::{CommandRecorder, GraphicsDevice};
