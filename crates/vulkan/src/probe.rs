// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Probe
//!
//! Read-only capability queries.  `Prober` is the seam between decisions and the driver: the
//! selector, resolver, and negotiator only ever ask a `Prober`, so they can be exercised against a
//! fake device list.  An empty answer is a valid answer.  Only a failing enumeration call is an
//! error.

use std::collections::BTreeSet;
use std::ffi::{CStr, CString};

use ash::vk;

use crate::prelude::*;

/// One queue family as advertised by a physical device.
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyRecord {
    pub index: u32,
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
}

impl QueueFamilyRecord {
    pub fn supports(&self, flags: vk::QueueFlags) -> bool {
        self.queue_count > 0 && self.flags.contains(flags)
    }
}

/// The subset of `vk::PhysicalDeviceProperties` that selection looks at.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    pub device_type: vk::PhysicalDeviceType,
    pub name: String,
    pub max_image_array_layers: u32,
    pub api_version: u32,
}

impl DeviceProperties {
    pub fn is_discrete(&self) -> bool {
        self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    /// `major.minor.patch` of the newest Vulkan the device implements.
    pub fn api_version_string(&self) -> String {
        let v = self.api_version;
        format!(
            "{}.{}.{}",
            vk::api_version_major(v),
            vk::api_version_minor(v),
            vk::api_version_patch(v)
        )
    }
}

/// What a surface will accept from a particular device.  Stale as soon as either changes.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain needs at least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub trait Prober {
    fn list_devices(&self) -> Result<Vec<vk::PhysicalDevice>, VulkanError>;

    fn device_properties(&self, device: vk::PhysicalDevice)
    -> Result<DeviceProperties, VulkanError>;

    fn device_features(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<vk::PhysicalDeviceFeatures, VulkanError>;

    /// Families in index order.
    fn queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<QueueFamilyRecord>, VulkanError>;

    fn device_extensions(&self, device: vk::PhysicalDevice)
    -> Result<BTreeSet<CString>, VulkanError>;

    fn presentation_support(
        &self,
        device: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, VulkanError>;

    fn surface_support(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<SurfaceSupport, VulkanError>;
}

/// A physical device and everything about it that does not depend on a surface.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub properties: DeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: Vec<QueueFamilyRecord>,
    pub extensions: BTreeSet<CString>,
}

impl DeviceCandidate {
    pub fn query<P: Prober + ?Sized>(
        prober: &P,
        handle: vk::PhysicalDevice,
    ) -> Result<Self, VulkanError> {
        Ok(Self {
            handle,
            properties: prober.device_properties(handle)?,
            features: prober.device_features(handle)?,
            queue_families: prober.queue_families(handle)?,
            extensions: prober.device_extensions(handle)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.contains(name)
    }
}

/// Every enumerated device, in enumeration order.
pub fn query_candidates<P: Prober + ?Sized>(
    prober: &P,
) -> Result<Vec<DeviceCandidate>, VulkanError> {
    prober
        .list_devices()?
        .into_iter()
        .map(|handle| DeviceCandidate::query(prober, handle))
        .collect()
}

/// `Prober` backed by a live instance.
pub struct AshProber<'a> {
    instance: &'a ash::Instance,
    surface_loader: &'a ash::khr::surface::Instance,
}

impl<'a> AshProber<'a> {
    pub fn new(instance: &'a ash::Instance, surface_loader: &'a ash::khr::surface::Instance) -> Self {
        Self {
            instance,
            surface_loader,
        }
    }
}

impl Prober for AshProber<'_> {
    fn list_devices(&self) -> Result<Vec<vk::PhysicalDevice>, VulkanError> {
        unsafe { self.instance.enumerate_physical_devices() }
            .map_err(VulkanError::query("physical devices"))
    }

    fn device_properties(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<DeviceProperties, VulkanError> {
        let props = unsafe { self.instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
        Ok(DeviceProperties {
            device_type: props.device_type,
            name: name.to_string_lossy().into_owned(),
            max_image_array_layers: props.limits.max_image_array_layers,
            api_version: props.api_version,
        })
    }

    fn device_features(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<vk::PhysicalDeviceFeatures, VulkanError> {
        Ok(unsafe { self.instance.get_physical_device_features(device) })
    }

    fn queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<QueueFamilyRecord>, VulkanError> {
        let qfps = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(device)
        };
        Ok(qfps
            .iter()
            .enumerate()
            .map(|(i, qf)| QueueFamilyRecord {
                index: i as u32,
                flags: qf.queue_flags,
                queue_count: qf.queue_count,
            })
            .collect())
    }

    fn device_extensions(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<BTreeSet<CString>, VulkanError> {
        let available = unsafe { self.instance.enumerate_device_extension_properties(device) }
            .map_err(VulkanError::query("device extensions"))?;
        Ok(available
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect())
    }

    fn presentation_support(
        &self,
        device: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, VulkanError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, family, surface)
        }
        .map_err(VulkanError::query("surface presentation support"))
    }

    fn surface_support(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<SurfaceSupport, VulkanError> {
        let loader = self.surface_loader;
        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(device, surface)
                    .map_err(VulkanError::query("surface capabilities"))?,
                formats: loader
                    .get_physical_device_surface_formats(device, surface)
                    .map_err(VulkanError::query("surface formats"))?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(device, surface)
                    .map_err(VulkanError::query("surface present modes"))?,
            })
        }
    }
}

/// In-memory device list for exercising the decision logic.
#[cfg(test)]
pub(crate) mod fake {
    use ash::vk::Handle;

    use super::*;

    pub(crate) fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5)
    }

    #[derive(Clone)]
    pub(crate) struct FakeDevice {
        pub properties: DeviceProperties,
        pub features: vk::PhysicalDeviceFeatures,
        pub families: Vec<QueueFamilyRecord>,
        /// Families that can present to `surface()`.
        pub presents: Vec<u32>,
        pub extensions: Vec<&'static CStr>,
        pub support: SurfaceSupport,
    }

    impl FakeDevice {
        /// One universal family that also presents, geometry shaders, and the swapchain extension.
        pub fn new(name: &str, device_type: vk::PhysicalDeviceType, layers: u32) -> Self {
            Self {
                properties: DeviceProperties {
                    device_type,
                    name: name.to_owned(),
                    max_image_array_layers: layers,
                    api_version: vk::API_VERSION_1_0,
                },
                features: vk::PhysicalDeviceFeatures {
                    geometry_shader: vk::TRUE,
                    ..Default::default()
                },
                families: vec![family(
                    0,
                    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                )],
                presents: vec![0],
                extensions: vec![ash::khr::swapchain::NAME],
                support: support(),
            }
        }

        pub fn discrete(name: &str, layers: u32) -> Self {
            Self::new(name, vk::PhysicalDeviceType::DISCRETE_GPU, layers)
        }

        pub fn integrated(name: &str, layers: u32) -> Self {
            Self::new(name, vk::PhysicalDeviceType::INTEGRATED_GPU, layers)
        }
    }

    pub(crate) fn family(index: u32, flags: vk::QueueFlags) -> QueueFamilyRecord {
        QueueFamilyRecord {
            index,
            flags,
            queue_count: 1,
        }
    }

    /// A typical desktop surface: FIFO and MAILBOX, BGRA sRGB, fixed 800x600 extent.
    pub(crate) fn support() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeProber {
        pub devices: Vec<FakeDevice>,
        /// Make `list_devices` fail.
        pub broken: bool,
    }

    impl FakeProber {
        pub fn new(devices: Vec<FakeDevice>) -> Self {
            Self {
                devices,
                broken: false,
            }
        }

        pub fn handle(index: usize) -> vk::PhysicalDevice {
            vk::PhysicalDevice::from_raw(index as u64 + 1)
        }

        fn device(&self, handle: vk::PhysicalDevice) -> Result<&FakeDevice, VulkanError> {
            (handle.as_raw() as usize)
                .checked_sub(1)
                .and_then(|i| self.devices.get(i))
                .ok_or(VulkanError::PlatformQuery {
                    what: "fake device",
                    result: vk::Result::ERROR_DEVICE_LOST,
                })
        }
    }

    impl Prober for FakeProber {
        fn list_devices(&self) -> Result<Vec<vk::PhysicalDevice>, VulkanError> {
            if self.broken {
                return Err(VulkanError::PlatformQuery {
                    what: "physical devices",
                    result: vk::Result::ERROR_INITIALIZATION_FAILED,
                });
            }
            Ok((0..self.devices.len()).map(Self::handle).collect())
        }

        fn device_properties(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<DeviceProperties, VulkanError> {
            Ok(self.device(device)?.properties.clone())
        }

        fn device_features(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<vk::PhysicalDeviceFeatures, VulkanError> {
            Ok(self.device(device)?.features)
        }

        fn queue_families(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<Vec<QueueFamilyRecord>, VulkanError> {
            Ok(self.device(device)?.families.clone())
        }

        fn device_extensions(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<BTreeSet<CString>, VulkanError> {
            Ok(self
                .device(device)?
                .extensions
                .iter()
                .map(|e| (*e).to_owned())
                .collect())
        }

        fn presentation_support(
            &self,
            device: vk::PhysicalDevice,
            family: u32,
            surface: vk::SurfaceKHR,
        ) -> Result<bool, VulkanError> {
            Ok(surface == super::fake::surface() && self.device(device)?.presents.contains(&family))
        }

        fn surface_support(
            &self,
            device: vk::PhysicalDevice,
            _surface: vk::SurfaceKHR,
        ) -> Result<SurfaceSupport, VulkanError> {
            Ok(self.device(device)?.support.clone())
        }
    }
}
