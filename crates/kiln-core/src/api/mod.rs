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

//! Plain data types shared between the core and native backends.
//!
//! Nothing in here owns GPU memory. These are the handles, descriptors and
//! capability flags that cross the [`GraphicsDevice`](crate::traits::GraphicsDevice)
//! and [`CommandRecorder`](crate::traits::CommandRecorder) contracts.

pub mod descriptors;
pub mod flags;
pub mod format;
pub mod handles;

pub use self::descriptors::*;
pub use self::flags::*;
pub use self::format::*;
pub use self::handles::*;

/// The default number of frames that may be in flight on the GPU at once.
/// Per-frame resources (recorders, descriptor table heaps) are buffered this many times.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
