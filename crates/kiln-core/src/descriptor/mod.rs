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

//! Descriptor heap allocation for backends that bind through tables.
//!
//! ```text
//! CPU heaps (long-lived views)        GPU table heaps (per frame in flight)
//! [res][res][   ][res] --copy-->      frame 0: [table A | table B | ...]
//! [smp][   ][smp]      --copy-->      frame 1: [table A | ...]
//! ```

mod allocator;
mod handle;
mod heap;
mod manager;

pub use allocator::DescriptorAllocator;
pub use handle::DescriptorHandle;
pub use heap::DescriptorHeap;
pub use manager::{BoundTables, DescriptorHeapManager, SamplerEntry, TableLayout};
