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

//! Redundancy-eliminating binding slots for the slot binding model.
//!
//! A [`BindingSlot`] remembers the identity and version of the object it last
//! bound and skips the backend call when nothing changed. A [`SlotGroup`]
//! batches an array of slots into one call over the smallest changed range.
//! Objects keep weak back-references to their slots so disposing an object
//! clears every slot still holding it.

mod group;
mod slot;
mod stage;
mod state;

pub use group::{GroupBinder, SlotGroup};
pub use slot::{BindingSlot, SlotBinder};
pub use stage::{StageBindTarget, StageBindings, StageLayout};
pub use state::{BindState, Bindable};
