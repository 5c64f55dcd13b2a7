// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Context
//!
//! `VkContext` runs the whole negotiation once and owns what comes out of it: instance, optional
//! debug messenger, surface, logical device with queues, and the swapchain images.  Teardown is the
//! reverse of acquisition, whether it happens at shutdown or halfway through a failed start.
//!
//! The decision half of the pipeline, `negotiate_device`, creates nothing and only needs a
//! `Prober`.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use crate::device::{ExecutionContext, create_execution_context};
use crate::instance::{DebugMessenger, InstanceConfig, create_instance};
use crate::prelude::*;
use crate::probe::{AshProber, DeviceCandidate, Prober, SurfaceSupport, query_candidates};
use crate::queue::{ResolvedQueueFamilies, resolve_queue_families};
use crate::select::{Requirements, select_best_device};
use crate::swapchain::{
    PresentableImageSet, SwapPreferences, negotiate_swap_config, provision_images,
};

#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub instance: InstanceConfig,
    pub requirements: Requirements,
    pub swap: SwapPreferences,
}

/// The chosen device and what it resolved to against the surface.
#[derive(Debug, Clone)]
pub struct NegotiatedDevice {
    pub candidate: DeviceCandidate,
    pub families: ResolvedQueueFamilies,
    pub surface_support: SurfaceSupport,
}

/// Probe, select, resolve.  No resources are created.
pub fn negotiate_device<P: Prober + ?Sized>(
    prober: &P,
    requirements: &Requirements,
    surface: vk::SurfaceKHR,
    log: &dyn LogSink,
) -> Result<NegotiatedDevice, VulkanError> {
    let candidates = query_candidates(prober)?;
    log.info(&format!("{} physical device(s) enumerated", candidates.len()));

    let candidate = select_best_device(prober, candidates, requirements, surface, log)?;
    let families = resolve_queue_families(prober, &candidate, surface)?;
    let surface_support = prober.surface_support(candidate.handle, surface)?;

    Ok(NegotiatedDevice {
        candidate,
        families,
        surface_support,
    })
}

pub struct VkContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    /// Used to access surface functions
    pub surface_loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub physical_device: DeviceCandidate,
    pub surface_support: SurfaceSupport,
    /// Vulkan logical device and queues
    pub execution: ExecutionContext,
    pub images: PresentableImageSet,

    debug: Option<DebugMessenger>,
    log: Arc<dyn LogSink>,
}

/// Whatever has been created so far on the way to a `VkContext`.
#[derive(Default)]
struct Acquired {
    debug: Option<DebugMessenger>,
    surface: Option<vk::SurfaceKHR>,
    execution: Option<ExecutionContext>,
    images: Option<PresentableImageSet>,
}

impl Acquired {
    /// Reverse acquisition order.  The instance is the caller's.
    fn release(self, surface_loader: &ash::khr::surface::Instance, log: &dyn LogSink) {
        if let Some(execution) = self.execution {
            if let Some(images) = self.images {
                images.destroy(execution.device());
            }
            execution.destroy(log);
        }
        if let Some(surface) = self.surface {
            unsafe { surface_loader.destroy_surface(surface, None) };
        }
        if let Some(debug) = self.debug {
            debug.destroy();
        }
    }

    /// Release and hand back the error that stopped acquisition.
    fn abandon(
        self,
        surface_loader: &ash::khr::surface::Instance,
        log: &dyn LogSink,
        error: VulkanError,
    ) -> VulkanError {
        self.release(surface_loader, log);
        error
    }
}

/// Every stage, acquired.
struct Stages {
    debug: Option<DebugMessenger>,
    surface: vk::SurfaceKHR,
    negotiated: NegotiatedDevice,
    execution: ExecutionContext,
    images: PresentableImageSet,
}

/// Each stage either succeeds or releases everything before it.
fn acquire<F>(
    entry: &ash::Entry,
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    config: &ContextConfig,
    log: &Arc<dyn LogSink>,
    create_surface: F,
) -> Result<Stages, VulkanError>
where
    F: FnOnce(&ash::Entry, &ash::Instance) -> Result<vk::SurfaceKHR, VulkanError>,
{
    let debug = if config.instance.validation {
        Some(DebugMessenger::new(entry, instance, log.clone())?)
    } else {
        None
    };

    let surface = match create_surface(entry, instance) {
        Ok(surface) => surface,
        Err(e) => {
            let partial = Acquired {
                debug,
                ..Acquired::default()
            };
            return Err(partial.abandon(surface_loader, &**log, e));
        }
    };

    let prober = AshProber::new(instance, surface_loader);
    let negotiated = negotiate_device(&prober, &config.requirements, surface, &**log)
        .and_then(|negotiated| {
            let execution = create_execution_context(
                instance,
                &negotiated.candidate,
                negotiated.families,
                &config.requirements,
                &**log,
            )?;
            Ok((negotiated, execution))
        });
    let (negotiated, execution) = match negotiated {
        Ok(pair) => pair,
        Err(e) => {
            let partial = Acquired {
                debug,
                surface: Some(surface),
                ..Acquired::default()
            };
            return Err(partial.abandon(surface_loader, &**log, e));
        }
    };

    let images = negotiate_swap_config(
        &negotiated.surface_support,
        negotiated.families,
        &config.swap,
        &**log,
    )
    .and_then(|swap_config| provision_images(instance, &execution, surface, &swap_config, &**log));
    let images = match images {
        Ok(images) => images,
        Err(e) => {
            let partial = Acquired {
                debug,
                surface: Some(surface),
                execution: Some(execution),
                images: None,
            };
            return Err(partial.abandon(surface_loader, &**log, e));
        }
    };

    Ok(Stages {
        debug,
        surface,
        negotiated,
        execution,
        images,
    })
}

impl VkContext {
    /// Load Vulkan, create an instance with `surface_extensions`, then run every stage against the
    /// surface `create_surface` makes.  On failure nothing outlives the call.
    pub fn with_surface<F>(
        surface_extensions: &[&'static CStr],
        config: &ContextConfig,
        log: Arc<dyn LogSink>,
        create_surface: F,
    ) -> Result<Self, VulkanError>
    where
        F: FnOnce(&ash::Entry, &ash::Instance) -> Result<vk::SurfaceKHR, VulkanError>,
    {
        let entry = unsafe { ash::Entry::load()? };

        let instance_config = InstanceConfig {
            window_extensions: surface_extensions.to_vec(),
            ..config.instance.clone()
        };
        let instance = create_instance(&entry, &instance_config, &*log)?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let stages = match acquire(
            &entry,
            &instance,
            &surface_loader,
            config,
            &log,
            create_surface,
        ) {
            Ok(stages) => stages,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        Ok(Self {
            entry,
            instance,
            surface_loader,
            surface: stages.surface,
            physical_device: stages.negotiated.candidate,
            surface_support: stages.negotiated.surface_support,
            execution: stages.execution,
            images: stages.images,
            debug: stages.debug,
            log,
        })
    }

    /// No window.  Presents to a `VK_EXT_headless_surface` surface.
    pub fn headless(config: &ContextConfig, log: Arc<dyn LogSink>) -> Result<Self, VulkanError> {
        let extensions = [ash::khr::surface::NAME, ash::ext::headless_surface::NAME];
        Self::with_surface(&extensions, config, log, |entry, instance| {
            let loader = ash::ext::headless_surface::Instance::new(entry, instance);
            let info = vk::HeadlessSurfaceCreateInfoEXT::default();
            unsafe { loader.create_headless_surface(&info, None) }
                .map_err(VulkanError::SurfaceCreation)
        })
    }

    pub fn device(&self) -> &ash::Device {
        self.execution.device()
    }

    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }

    /// Reverse acquisition order: views and swapchain, device, surface, messenger, instance.
    pub fn destroy(self) {
        let acquired = Acquired {
            debug: self.debug,
            surface: Some(self.surface),
            execution: Some(self.execution),
            images: Some(self.images),
        };
        acquired.release(&self.surface_loader, &*self.log);
        unsafe { self.instance.destroy_instance(None) };
    }
}

#[cfg(feature = "window")]
mod window {
    use std::ffi::CStr;
    use std::sync::Arc;

    use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

    use super::*;

    impl VkContext {
        /// Negotiate against any window that exposes raw handles.
        pub fn for_window<W: HasDisplayHandle + HasWindowHandle>(
            window: &W,
            config: &ContextConfig,
            log: Arc<dyn LogSink>,
        ) -> Result<Self, VulkanError> {
            let display = window.display_handle()?.as_raw();
            let window = window.window_handle()?.as_raw();
            Self::new(display, window, config, log)
        }

        /// `for_window`, but a failure is logged as critical and handed to `reporter` before
        /// returning.
        pub fn establish<W: HasDisplayHandle + HasWindowHandle>(
            window: &W,
            config: &ContextConfig,
            log: Arc<dyn LogSink>,
            reporter: &dyn FatalReporter,
        ) -> Result<Self, VulkanError> {
            Self::for_window(window, config, log.clone()).inspect_err(|e| {
                let message = format!("GPU context negotiation failed: {e}");
                log.critical(&message);
                reporter.report_fatal(&message);
            })
        }

        pub fn new(
            display: RawDisplayHandle,
            window: RawWindowHandle,
            config: &ContextConfig,
            log: Arc<dyn LogSink>,
        ) -> Result<Self, VulkanError> {
            let window_extensions: Vec<&'static CStr> =
                ash_window::enumerate_required_extensions(display)
                    .map_err(VulkanError::query("window extensions"))?
                    .iter()
                    .map(|&ext| unsafe { CStr::from_ptr(ext) })
                    .collect();

            Self::with_surface(&window_extensions, config, log, |entry, instance| {
                unsafe { ash_window::create_surface(entry, instance, display, window, None) }
                    .map_err(VulkanError::SurfaceCreation)
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::probe::fake::*;
    use crate::report::RecordingSink;

    #[test]
    fn test_negotiate_split_families() {
        let mut device = FakeDevice::discrete("split", 2048);
        device.families = vec![
            family(0, vk::QueueFlags::GRAPHICS),
            family(1, vk::QueueFlags::TRANSFER),
        ];
        device.presents = vec![1];
        let prober = FakeProber::new(vec![FakeDevice::integrated("igpu", 256), device]);

        let negotiated =
            negotiate_device(&prober, &Requirements::default(), surface(), &RecordingSink::new())
                .unwrap();
        assert_eq!(negotiated.candidate.name(), "split");
        assert_eq!(
            negotiated.families,
            ResolvedQueueFamilies {
                graphics: 0,
                present: 1,
            }
        );
        assert!(negotiated.surface_support.is_adequate());
    }

    #[test]
    fn test_enumeration_failure_stops_negotiation() {
        let prober = FakeProber {
            broken: true,
            ..Default::default()
        };
        let sink = RecordingSink::new();
        let result = negotiate_device(&prober, &Requirements::default(), surface(), &sink);
        assert!(matches!(result, Err(VulkanError::PlatformQuery { .. })));
        assert!(sink.records().is_empty());
    }
}
