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

//! Checks run before a copy task is built.
//!
//! A copy that could never succeed on the GPU is rejected here, at the call
//! that requested it, rather than failing later inside a queued task.

use super::{GpuResource, GpuTexture, ResourceKind};
use crate::api::{ResourceFlags, ResourceRegion};
use crate::error::CopyError;
use std::ops::Range;

/// Selects the sub-resources and region of a texture-to-texture copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubResourceCopy {
    /// Mip level read from.
    pub source_level: u32,
    /// Array slice read from.
    pub source_slice: u32,
    /// Mip level written to.
    pub destination_level: u32,
    /// Array slice written to.
    pub destination_slice: u32,
    /// Region of the source sub-resource. `None` copies all of it.
    pub region: Option<ResourceRegion>,
    /// Where the region lands in the destination sub-resource.
    pub destination_origin: [u32; 3],
}

fn ensure_live(source: &dyn GpuResource, destination: &dyn GpuResource) -> Result<(), CopyError> {
    for resource in [source, destination] {
        if resource.is_disposed() {
            return Err(CopyError::Disposed(resource.label().to_owned()));
        }
    }
    Ok(())
}

/// Validates a whole-resource copy.
///
/// The source must be GPU readable and the destination GPU writable. Textures
/// must match in format and dimensions, and a destination buffer must be at
/// least as large as the source.
pub fn validate_copy(
    source: &dyn GpuResource,
    destination: &dyn GpuResource,
) -> Result<(), CopyError> {
    ensure_live(source, destination)?;
    if !source.flags().is_gpu_readable() {
        return Err(CopyError::SourceNotGpuReadable(source.label().to_owned()));
    }
    if !destination.flags().is_gpu_writable() {
        return Err(CopyError::DestinationNotGpuWritable(
            destination.label().to_owned(),
        ));
    }

    match (source.kind(), destination.kind()) {
        (ResourceKind::Texture(src), ResourceKind::Texture(dst)) => {
            if src.format() != dst.format() {
                return Err(CopyError::FormatMismatch {
                    source_format: src.format(),
                    destination_format: dst.format(),
                });
            }
            if src.extent() != dst.extent() {
                return Err(CopyError::DimensionMismatch {
                    source_extent: src.extent(),
                    destination_extent: dst.extent(),
                });
            }
            Ok(())
        }
        (ResourceKind::Buffer(src), ResourceKind::Buffer(dst)) => {
            if dst.size_in_bytes() < src.size_in_bytes() {
                return Err(CopyError::DestinationTooSmall {
                    label: dst.label().to_owned(),
                    required: src.size_in_bytes(),
                    available: dst.size_in_bytes(),
                });
            }
            Ok(())
        }
        (ResourceKind::Buffer(_), ResourceKind::Texture(_)) => Ok(()),
        (ResourceKind::Texture(_), ResourceKind::Buffer(_)) => {
            Err(CopyError::Unsupported("texture to buffer copies"))
        }
    }
}

/// Validates a copy of the byte range `range` of a source buffer to
/// `destination_offset` in a destination buffer.
pub fn validate_region_copy(
    source: &dyn GpuResource,
    range: &Range<u64>,
    destination: &dyn GpuResource,
    destination_offset: u64,
) -> Result<(), CopyError> {
    ensure_live(source, destination)?;
    if !source.flags().is_gpu_readable() {
        return Err(CopyError::SourceNotGpuReadable(source.label().to_owned()));
    }
    if !destination.flags().is_gpu_writable() {
        return Err(CopyError::DestinationNotGpuWritable(
            destination.label().to_owned(),
        ));
    }
    if !matches!(
        (source.kind(), destination.kind()),
        (ResourceKind::Buffer(_), ResourceKind::Buffer(_))
    ) {
        return Err(CopyError::Unsupported("byte range copies between non-buffers"));
    }
    if range.start >= range.end || range.end > source.size_in_bytes() {
        return Err(CopyError::RegionOutOfBounds(source.label().to_owned()));
    }

    let required = range.end - range.start;
    let available = destination
        .size_in_bytes()
        .saturating_sub(destination_offset);
    if available < required {
        return Err(CopyError::DestinationTooSmall {
            label: destination.label().to_owned(),
            required,
            available,
        });
    }
    Ok(())
}

fn check_subresource(texture: &GpuTexture, level: u32, slice: u32) -> Result<(), CopyError> {
    if level >= texture.mip_levels() {
        return Err(CopyError::MipLevelOutOfRange {
            label: texture.label().to_owned(),
            level,
            count: texture.mip_levels(),
        });
    }
    if slice >= texture.array_layers() {
        return Err(CopyError::ArraySliceOutOfRange {
            label: texture.label().to_owned(),
            slice,
            count: texture.array_layers(),
        });
    }
    Ok(())
}

fn fits(origin: [u32; 3], extent: [u32; 3], bounds: [u32; 3]) -> bool {
    (0..3).all(|axis| {
        origin[axis]
            .checked_add(extent[axis])
            .is_some_and(|end| end <= bounds[axis])
    })
}

/// Validates a texture sub-resource copy.
///
/// Staging copies pair an uploadable source with a downloadable destination
/// of the same format. Mip and slice indices are checked against each texture's own counts, and
/// the region against the extent of the selected mip levels.
pub fn validate_subresource_copy(
    source: &GpuTexture,
    destination: &GpuTexture,
    copy: &SubResourceCopy,
) -> Result<(), CopyError> {
    ensure_live(source, destination)?;
    if !source.flags().contains(ResourceFlags::UPLOAD_MEMORY) {
        return Err(CopyError::SourceNotUploadable(source.label().to_owned()));
    }
    if !destination.flags().contains(ResourceFlags::DOWNLOAD_MEMORY) {
        return Err(CopyError::DestinationNotDownloadable(
            destination.label().to_owned(),
        ));
    }
    if source.format() != destination.format() {
        return Err(CopyError::FormatMismatch {
            source_format: source.format(),
            destination_format: destination.format(),
        });
    }
    check_subresource(source, copy.source_level, copy.source_slice)?;
    check_subresource(destination, copy.destination_level, copy.destination_slice)?;

    let source_bounds = source.mip_extent(copy.source_level);
    let region = copy.region.unwrap_or(ResourceRegion {
        start: [0; 3],
        end: source_bounds,
    });
    if region.is_empty() || !fits(region.start, region.extent(), source_bounds) {
        return Err(CopyError::RegionOutOfBounds(source.label().to_owned()));
    }
    let destination_bounds = destination.mip_extent(copy.destination_level);
    if !fits(copy.destination_origin, region.extent(), destination_bounds) {
        return Err(CopyError::RegionOutOfBounds(destination.label().to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::*;
    use crate::settings::GpuSettings;
    use crate::test_support::MockGraphicsDevice;
    use crate::resource::GpuBuffer;
    use crate::DeviceContext;
    use std::sync::Arc;

    fn context() -> DeviceContext {
        DeviceContext::new(MockGraphicsDevice::new(), GpuSettings::default())
    }

    fn texture(
        context: &DeviceContext,
        label: &'static str,
        size: u32,
        format: ResourceFormat,
        flags: ResourceFlags,
    ) -> Arc<GpuTexture> {
        context
            .create_texture(&TextureDescriptor {
                label: Some(label.into()),
                width: size,
                height: size,
                mip_levels: 3,
                array_layers: 2,
                format,
                flags,
                ..Default::default()
            })
            .unwrap()
    }

    fn buffer(context: &DeviceContext, size: u32, flags: ResourceFlags) -> Arc<GpuBuffer> {
        context
            .create_buffer(&BufferDescriptor {
                stride: 1,
                element_count: size,
                flags,
                ..Default::default()
            })
            .unwrap()
    }

    const RW: ResourceFlags = ResourceFlags::GPU_READ.union(ResourceFlags::GPU_WRITE);

    #[test]
    fn test_texture_copy_requires_matching_shape() {
        let context = context();
        let a = texture(&context, "a", 64, ResourceFormat::Rgba8Unorm, RW);
        let b = texture(&context, "b", 64, ResourceFormat::Rgba8Unorm, RW);
        let small = texture(&context, "small", 32, ResourceFormat::Rgba8Unorm, RW);
        let float = texture(&context, "float", 64, ResourceFormat::Rgba16Float, RW);

        assert_eq!(validate_copy(a.as_ref(), b.as_ref()), Ok(()));
        assert!(matches!(
            validate_copy(a.as_ref(), small.as_ref()),
            Err(CopyError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            validate_copy(a.as_ref(), float.as_ref()),
            Err(CopyError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_copy_flags_are_checked() {
        let context = context();
        let readable = buffer(&context, 64, ResourceFlags::GPU_READ);
        let writable = buffer(&context, 64, ResourceFlags::GPU_WRITE);

        assert_eq!(validate_copy(readable.as_ref(), writable.as_ref()), Ok(()));
        assert!(matches!(
            validate_copy(writable.as_ref(), readable.as_ref()),
            Err(CopyError::SourceNotGpuReadable(_))
        ));
        assert!(matches!(
            validate_copy(readable.as_ref(), readable.as_ref()),
            Err(CopyError::DestinationNotGpuWritable(_))
        ));
    }

    #[test]
    fn test_buffer_copy_requires_room() {
        let context = context();
        let large = buffer(&context, 128, RW);
        let small = buffer(&context, 64, RW);

        assert!(matches!(
            validate_copy(large.as_ref(), small.as_ref()),
            Err(CopyError::DestinationTooSmall { required: 128, available: 64, .. })
        ));
        assert_eq!(validate_region_copy(large.as_ref(), &(0..64), small.as_ref(), 0), Ok(()));
        assert!(matches!(
            validate_region_copy(large.as_ref(), &(0..64), small.as_ref(), 32),
            Err(CopyError::DestinationTooSmall { .. })
        ));
        assert!(matches!(
            validate_region_copy(large.as_ref(), &(100..200), small.as_ref(), 0),
            Err(CopyError::RegionOutOfBounds(_))
        ));
    }

    #[test]
    fn test_texture_to_buffer_is_unsupported() {
        let context = context();
        let tex = texture(&context, "tex", 8, ResourceFormat::Rgba8Unorm, RW);
        let buf = buffer(&context, 1024, RW);
        assert_eq!(
            validate_copy(tex.as_ref(), buf.as_ref()),
            Err(CopyError::Unsupported("texture to buffer copies"))
        );
        assert_eq!(validate_copy(buf.as_ref(), tex.as_ref()), Ok(()));
    }

    #[test]
    fn test_subresource_copy_bounds() {
        let context = context();
        let staging = ResourceFlags::UPLOAD_MEMORY | ResourceFlags::DENY_SHADER_ACCESS;
        let readback = ResourceFlags::DOWNLOAD_MEMORY | ResourceFlags::GPU_WRITE;
        let src = texture(&context, "src", 64, ResourceFormat::Rgba8Unorm, staging);
        let dst = texture(&context, "dst", 16, ResourceFormat::Rgba8Unorm, readback);

        // Mip 2 of the source is 16x16, the size of mip 0 of the destination.
        let copy = SubResourceCopy {
            source_level: 2,
            source_slice: 1,
            ..Default::default()
        };
        assert_eq!(validate_subresource_copy(&src, &dst, &copy), Ok(()));

        let copy = SubResourceCopy {
            source_level: 3,
            ..Default::default()
        };
        assert!(matches!(
            validate_subresource_copy(&src, &dst, &copy),
            Err(CopyError::MipLevelOutOfRange { level: 3, count: 3, .. })
        ));

        let copy = SubResourceCopy {
            source_level: 2,
            destination_slice: 2,
            ..Default::default()
        };
        assert!(matches!(
            validate_subresource_copy(&src, &dst, &copy),
            Err(CopyError::ArraySliceOutOfRange { slice: 2, count: 2, .. })
        ));

        // The whole of mip 0 does not fit in the destination.
        let copy = SubResourceCopy::default();
        assert!(matches!(
            validate_subresource_copy(&src, &dst, &copy),
            Err(CopyError::RegionOutOfBounds(_))
        ));

        let copy = SubResourceCopy {
            region: Some(ResourceRegion {
                start: [0, 0, 0],
                end: [8, 8, 1],
            }),
            destination_origin: [8, 8, 0],
            ..Default::default()
        };
        assert_eq!(validate_subresource_copy(&src, &dst, &copy), Ok(()));
    }

    #[test]
    fn test_subresource_copy_requires_staging_pair() {
        let context = context();
        let src = texture(&context, "src", 16, ResourceFormat::Rgba8Unorm, RW);
        let dst = texture(&context, "dst", 16, ResourceFormat::Rgba8Unorm, RW);
        assert!(matches!(
            validate_subresource_copy(&src, &dst, &SubResourceCopy::default()),
            Err(CopyError::SourceNotUploadable(_))
        ));
    }

    #[test]
    fn test_subresource_copy_requires_matching_format() {
        let context = context();
        let staging = ResourceFlags::UPLOAD_MEMORY | ResourceFlags::DENY_SHADER_ACCESS;
        let readback = ResourceFlags::DOWNLOAD_MEMORY | ResourceFlags::GPU_WRITE;
        let src = texture(&context, "src", 16, ResourceFormat::Rgba8Unorm, staging);
        let dst = texture(&context, "dst", 16, ResourceFormat::R32Float, readback);
        assert_eq!(
            validate_subresource_copy(&src, &dst, &SubResourceCopy::default()),
            Err(CopyError::FormatMismatch {
                source_format: ResourceFormat::Rgba8Unorm,
                destination_format: ResourceFormat::R32Float,
            })
        );
    }

    #[test]
    fn test_disposed_resources_cannot_be_copied() {
        let context = context();
        let a = buffer(&context, 16, RW);
        let b = buffer(&context, 16, RW);
        b.dispose();
        assert!(matches!(
            validate_copy(a.as_ref(), b.as_ref()),
            Err(CopyError::Disposed(_))
        ));
    }
}
