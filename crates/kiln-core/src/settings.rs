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

//! Tunable settings of the GPU core.

use crate::api::MAX_FRAMES_IN_FLIGHT;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings that shape per-frame buffering and heap sizes.
///
/// Every field has a default, so a settings document only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    /// How many frames may be recorded ahead of the GPU. Per-frame recorders
    /// and descriptor table heaps are buffered this many times.
    pub frames_in_flight: usize,
    /// Descriptors per GPU-visible resource table heap page.
    pub resource_table_heap_size: u32,
    /// Descriptors per GPU-visible sampler table heap page.
    pub sampler_table_heap_size: u32,
    /// Descriptors per CPU-visible heap page.
    pub cpu_heap_page_size: u32,
    /// Alignment used by root buffers created without an explicit one.
    pub default_buffer_alignment: u32,
    /// Rejects compute dispatches that exceed the device's group limits.
    pub validate_dispatch_limits: bool,
    /// Forwards resource labels to the backend for debugging tools.
    pub debug_labels: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            resource_table_heap_size: 512,
            sampler_table_heap_size: 256,
            cpu_heap_page_size: 512,
            default_buffer_alignment: 1,
            validate_dispatch_limits: true,
            debug_labels: true,
        }
    }
}

impl GpuSettings {
    /// Parses settings from a JSON document. Missing fields keep their defaults.
    ///
    /// ## Errors
    /// * `serde_json::Error` - If the document is not valid JSON for this struct.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let settings: Self = serde_json::from_str(json)?;
        Ok(settings.sanitized())
    }

    /// Reads and parses a JSON settings file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read GPU settings from '{}'", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Failed to parse GPU settings in '{}'", path.display()))
    }

    /// Clamps values that would make the core unusable.
    pub fn sanitized(mut self) -> Self {
        self.frames_in_flight = self.frames_in_flight.max(1);
        self.resource_table_heap_size = self.resource_table_heap_size.max(1);
        self.sampler_table_heap_size = self.sampler_table_heap_size.max(1);
        self.cpu_heap_page_size = self.cpu_heap_page_size.max(1);
        self.default_buffer_alignment = self.default_buffer_alignment.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = GpuSettings::default();
        assert_eq!(settings.frames_in_flight, MAX_FRAMES_IN_FLIGHT);
        assert_eq!(settings.resource_table_heap_size, 512);
        assert_eq!(settings.sampler_table_heap_size, 256);
        assert_eq!(settings.cpu_heap_page_size, 512);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = GpuSettings::from_json_str(r#"{ "frames_in_flight": 3 }"#).unwrap();
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.sampler_table_heap_size, 256);
        assert!(settings.validate_dispatch_limits);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let settings =
            GpuSettings::from_json_str(r#"{ "frames_in_flight": 0, "cpu_heap_page_size": 0 }"#)
                .unwrap();
        assert_eq!(settings.frames_in_flight, 1);
        assert_eq!(settings.cpu_heap_page_size, 1);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(GpuSettings::from_json_str("{ frames_in_flight: }").is_err());
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = GpuSettings::load("/definitely/not/here/gpu.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here/gpu.json"));
    }

    #[test]
    fn test_round_trip_through_json() {
        let settings = GpuSettings {
            frames_in_flight: 3,
            debug_labels: false,
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(GpuSettings::from_json_str(&json).unwrap(), settings);
    }
}
