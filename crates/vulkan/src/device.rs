// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Device
//!
//! Binding a physical device to a logical one.  The `ExecutionContext` outlives everything created
//! from it and dies before the instance.

use std::ffi::c_char;

use ash::vk;

use crate::prelude::*;
use crate::probe::DeviceCandidate;
use crate::queue::{Queues, ResolvedQueueFamilies};
use crate::select::Requirements;

/// Every requested queue gets the same priority.
const QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Logical device and its queues.
pub struct ExecutionContext {
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queues: Queues,
}

/// Create the logical device with the required extensions and features enabled, then fetch one
/// queue per distinct family.  Taking `ResolvedQueueFamilies` means an incomplete resolution cannot
/// reach this point.
pub fn create_execution_context(
    instance: &ash::Instance,
    candidate: &DeviceCandidate,
    families: ResolvedQueueFamilies,
    requirements: &Requirements,
    log: &dyn LogSink,
) -> Result<ExecutionContext, VulkanError> {
    let queue_infos = families.queue_infos(&QUEUE_PRIORITIES);
    let extensions: Vec<*const c_char> = requirements
        .extensions
        .iter()
        .map(|e| e.as_ptr())
        .collect();
    let features = requirements.enabled_features();

    let device_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(candidate.handle, &device_info, None) }
        .map_err(VulkanError::DeviceCreation)?;
    let queues = Queues::new(&device, families);

    log.info(&format!(
        "logical device bound on {}: {} queue(s), graphics family {}, present family {}",
        candidate.name(),
        queue_infos.len(),
        families.graphics,
        families.present,
    ));

    Ok(ExecutionContext {
        physical_device: candidate.handle,
        device,
        queues,
    })
}

impl ExecutionContext {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn families(&self) -> ResolvedQueueFamilies {
        self.queues.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.queues.graphics_queue()
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.queues.present_queue()
    }

    /// Everything created from this device must already be gone.
    pub fn destroy(self, log: &dyn LogSink) {
        unsafe {
            report_wait_idle(self.device.device_wait_idle(), log);
            self.device.destroy_device(None);
        }
    }
}

/// A lost device is still destroyed.  The failure is only logged.
fn report_wait_idle(result: ash::prelude::VkResult<()>, log: &dyn LogSink) {
    if let Err(result) = result {
        log.warn(&format!("device wait idle failed during teardown: {result:?}"));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::report::RecordingSink;

    #[test]
    fn test_lost_device_during_teardown_is_logged() {
        let sink = RecordingSink::new();
        report_wait_idle(Err(vk::Result::ERROR_DEVICE_LOST), &sink);
        let warnings = sink.at(log::Level::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ERROR_DEVICE_LOST"));
    }

    #[test]
    fn test_idle_device_teardown_is_quiet() {
        let sink = RecordingSink::new();
        report_wait_idle(Ok(()), &sink);
        assert!(sink.records().is_empty());
    }
}
