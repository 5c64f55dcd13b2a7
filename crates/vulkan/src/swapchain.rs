// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Swapchain
//!
//! Negotiation is pure: `SurfaceSupport` in, `SwapSurfaceConfig` out, same answer every time.
//! Provisioning turns a config into a swapchain and one view per image.  Neither step looks at
//! device selection, so a resized surface only needs a fresh `SurfaceSupport` and both steps again.

use ash::vk;
use smallvec::SmallVec;

use crate::device::ExecutionContext;
use crate::prelude::*;
use crate::probe::SurfaceSupport;
use crate::queue::ResolvedQueueFamilies;

/// 8-bit BGRA in sRGB, presented as sRGB.
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Surfaces that let the swapchain pick the size report this width.
pub const UNDEFINED_EXTENT: u32 = u32::MAX;

/// Caller preferences that negotiation may have to overrule.
#[derive(Debug, Clone, Copy)]
pub struct SwapPreferences {
    pub present_mode: vk::PresentModeKHR,
    /// Only consulted when the surface leaves the extent to us.
    pub extent_hint: vk::Extent2D,
}

impl Default for SwapPreferences {
    fn default() -> Self {
        Self {
            present_mode: vk::PresentModeKHR::MAILBOX,
            extent_hint: vk::Extent2D {
                width: 800,
                height: 600,
            },
        }
    }
}

/// Image sharing between queue families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sharing {
    pub mode: vk::SharingMode,
    /// Empty for exclusive access.
    pub families: SmallVec<u32, 2>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapSurfaceConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: Sharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Preferred format if advertised, otherwise the first advertised pair with a warning.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    log: &dyn LogSink,
) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().find(|f| {
        f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
    });
    match preferred {
        Some(f) => Some(*f),
        None => {
            let first = formats.first().copied()?;
            log.warn(&format!(
                "surface lacks {:?}/{:?}, falling back to {:?}/{:?}",
                PREFERRED_FORMAT.format,
                PREFERRED_FORMAT.color_space,
                first.format,
                first.color_space
            ));
            Some(first)
        }
    }
}

/// `preferred` if advertised, otherwise FIFO with a warning.  FIFO support is guaranteed.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
    log: &dyn LogSink,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        if preferred != vk::PresentModeKHR::FIFO {
            log.warn(&format!(
                "present mode {preferred:?} unavailable, falling back to FIFO"
            ));
        }
        vk::PresentModeKHR::FIFO
    }
}

/// A defined current extent is authoritative.  Otherwise clamp the hint into the allowed range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, hint: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != UNDEFINED_EXTENT {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: hint
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: hint
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One over the minimum so we are not left waiting on the presentation engine.  A maximum of 0
/// means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count.saturating_add(1);
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// Concurrent across both families when they differ, exclusive otherwise.
pub fn choose_sharing(families: ResolvedQueueFamilies) -> Sharing {
    if families.is_shared() {
        Sharing {
            mode: vk::SharingMode::EXCLUSIVE,
            families: SmallVec::new(),
        }
    } else {
        Sharing {
            mode: vk::SharingMode::CONCURRENT,
            families: families.distinct(),
        }
    }
}

fn pick_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|alpha| caps.supported_composite_alpha.contains(*alpha))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

pub fn negotiate_swap_config(
    support: &SurfaceSupport,
    families: ResolvedQueueFamilies,
    preferences: &SwapPreferences,
    log: &dyn LogSink,
) -> Result<SwapSurfaceConfig, VulkanError> {
    let caps = &support.capabilities;
    let format =
        choose_surface_format(&support.formats, log).ok_or(VulkanError::InadequateSurface)?;

    Ok(SwapSurfaceConfig {
        format: format.format,
        color_space: format.color_space,
        present_mode: choose_present_mode(&support.present_modes, preferences.present_mode, log),
        extent: choose_extent(caps, preferences.extent_hint),
        image_count: choose_image_count(caps),
        sharing: choose_sharing(families),
        pre_transform: caps.current_transform,
        composite_alpha: pick_alpha(caps),
    })
}

/// The swapchain, its images, and one view per image.
pub struct PresentableImageSet {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub config: SwapSurfaceConfig,
    loader: ash::khr::swapchain::Device,
}

pub fn provision_images(
    instance: &ash::Instance,
    context: &ExecutionContext,
    surface: vk::SurfaceKHR,
    config: &SwapSurfaceConfig,
    log: &dyn LogSink,
) -> Result<PresentableImageSet, VulkanError> {
    let device = context.device();
    let loader = ash::khr::swapchain::Device::new(instance, device);

    let swapchain_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(config.image_count)
        .image_format(config.format)
        .image_color_space(config.color_space)
        .image_extent(config.extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(config.sharing.mode)
        .queue_family_indices(&config.sharing.families)
        .pre_transform(config.pre_transform)
        .composite_alpha(config.composite_alpha)
        .present_mode(config.present_mode)
        .clipped(true);

    let swapchain = unsafe { loader.create_swapchain(&swapchain_info, None) }
        .map_err(VulkanError::SwapchainCreation)?;

    // The platform may hand back more images than requested.  Its count wins.
    let images = match unsafe { loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(result) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(VulkanError::PlatformQuery {
                what: "swapchain images",
                result,
            });
        }
    };

    let mut views = Vec::with_capacity(images.len());
    for &image in &images {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(config.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => views.push(view),
            Err(result) => {
                unsafe {
                    for view in views.drain(..).rev() {
                        device.destroy_image_view(view, None);
                    }
                    loader.destroy_swapchain(swapchain, None);
                }
                return Err(VulkanError::ImageViewCreation(result));
            }
        }
    }

    log.info(&format!(
        "swapchain ready: {} image(s) ({} requested), {}x{}, {:?}, {:?}",
        images.len(),
        config.image_count,
        config.extent.width,
        config.extent.height,
        config.format,
        config.present_mode,
    ));

    Ok(PresentableImageSet {
        swapchain,
        images,
        views,
        config: config.clone(),
        loader,
    })
}

impl PresentableImageSet {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image and view for a swapchain image index, as returned by acquisition.
    pub fn render_target(&self, index: u32) -> Option<(vk::Image, vk::ImageView)> {
        let index = index as usize;
        Some((*self.images.get(index)?, *self.views.get(index)?))
    }

    /// Views first, then the swapchain that owns the images.
    pub fn destroy(self, device: &ash::Device) {
        unsafe {
            for view in self.views.iter().rev() {
                device.destroy_image_view(*view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::probe::fake::support;
    use crate::report::RecordingSink;

    const SHARED: ResolvedQueueFamilies = ResolvedQueueFamilies {
        graphics: 0,
        present: 0,
    };

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn unorm() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_preferred_format_chosen_without_warning() {
        let sink = RecordingSink::new();
        let chosen = choose_surface_format(&support().formats, &sink).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert!(sink.at(log::Level::Warn).is_empty());
    }

    #[test]
    fn test_format_falls_back_to_first_with_warning() {
        let sink = RecordingSink::new();
        // Right format, wrong color space does not count.
        let formats = [
            unorm(),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        let chosen = choose_surface_format(&formats, &sink).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(sink.at(log::Level::Warn).len(), 1);
    }

    #[test]
    fn test_no_formats_is_inadequate() {
        let mut support = support();
        support.formats.clear();
        let result = negotiate_swap_config(
            &support,
            SHARED,
            &SwapPreferences::default(),
            &RecordingSink::new(),
        );
        assert!(matches!(result, Err(VulkanError::InadequateSurface)));
    }

    #[test]
    fn test_present_mode_preference_and_fallback() {
        let sink = RecordingSink::new();
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX, &sink),
            vk::PresentModeKHR::MAILBOX
        );
        assert!(sink.at(log::Level::Warn).is_empty());

        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX, &sink),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(sink.at(log::Level::Warn).len(), 1);
    }

    #[test]
    fn test_extent_clamped_when_undefined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(UNDEFINED_EXTENT, UNDEFINED_EXTENT),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        let chosen = choose_extent(&caps, extent(8000, 600));
        assert_eq!(chosen, extent(4096, 600));

        let chosen = choose_extent(&caps, extent(0, 0));
        assert_eq!(chosen, extent(1, 1));
    }

    #[test]
    fn test_current_extent_is_authoritative() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        let chosen = choose_extent(&caps, extent(800, 600));
        assert_eq!(chosen, extent(1920, 1080));
    }

    #[test]
    fn test_image_count() {
        let caps = |min, max| vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps(2, 3)), 3);
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
        assert_eq!(choose_image_count(&caps(1, 8)), 2);
    }

    #[test]
    fn test_image_count_stays_in_bounds() {
        for min in 1..6 {
            for max in [0, min, min + 1, min + 4] {
                let caps = vk::SurfaceCapabilitiesKHR {
                    min_image_count: min,
                    max_image_count: max,
                    ..Default::default()
                };
                let count = choose_image_count(&caps);
                assert!(count >= min);
                if max != 0 {
                    assert!(count <= max);
                }
            }
        }
    }

    #[test]
    fn test_sharing_follows_family_split() {
        let exclusive = choose_sharing(SHARED);
        assert_eq!(exclusive.mode, vk::SharingMode::EXCLUSIVE);
        assert!(exclusive.families.is_empty());

        let concurrent = choose_sharing(ResolvedQueueFamilies {
            graphics: 0,
            present: 2,
        });
        assert_eq!(concurrent.mode, vk::SharingMode::CONCURRENT);
        assert_eq!(concurrent.families.as_slice(), &[0, 2]);
    }

    #[test]
    fn test_composite_alpha_preference() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
                | vk::CompositeAlphaFlagsKHR::INHERIT,
            ..Default::default()
        };
        assert_eq!(pick_alpha(&caps), vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED);
        assert_eq!(
            pick_alpha(&vk::SurfaceCapabilitiesKHR::default()),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
    }

    #[test]
    fn test_negotiation_is_idempotent() {
        let mut support = support();
        support.formats = vec![unorm()];
        support.present_modes = vec![vk::PresentModeKHR::FIFO];
        let sink = RecordingSink::new();
        let preferences = SwapPreferences::default();

        let first = negotiate_swap_config(&support, SHARED, &preferences, &sink).unwrap();
        let second = negotiate_swap_config(&support, SHARED, &preferences, &sink).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(first.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(first.image_count, 3);
        assert_eq!(first.extent, extent(800, 600));

        let mut resized = support.clone();
        resized.capabilities.current_extent = extent(1024, 768);
        let third = negotiate_swap_config(&resized, SHARED, &preferences, &sink).unwrap();
        assert_ne!(first, third);
        // One format warning and one present mode warning per run.
        assert_eq!(sink.at(log::Level::Warn).len(), 6);
    }
}
