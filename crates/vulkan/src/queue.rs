// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Queue
//!
//! Drawing and presenting may happen on one queue family or on two.  Resolution happens before the
//! logical device exists because the device must be told up front which families it will hand out
//! queues from.

use ash::vk;
use smallvec::SmallVec;

use crate::prelude::*;
use crate::probe::{DeviceCandidate, Prober, QueueFamilyRecord};

/// Queue family choices while scanning.  Either role may still be unassigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Promote to `ResolvedQueueFamilies`, the only form the binder accepts.
    pub fn complete(self) -> Result<ResolvedQueueFamilies, VulkanError> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok(ResolvedQueueFamilies { graphics, present }),
            (graphics, present) => Err(VulkanError::IncompleteQueueFamilies { graphics, present }),
        }
    }
}

/// Both roles assigned.  The two indices may alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedQueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl ResolvedQueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Each family index once, graphics first.
    pub fn distinct(&self) -> SmallVec<u32, 2> {
        let mut families = SmallVec::new();
        families.push(self.graphics);
        if !self.is_shared() {
            families.push(self.present);
        }
        families
    }

    /// One create info per distinct family, one queue each.  `priorities` must outlive the infos.
    pub fn queue_infos<'a>(&self, priorities: &'a [f32]) -> SmallVec<vk::DeviceQueueCreateInfo<'a>, 2> {
        self.distinct()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(priorities)
            })
            .collect()
    }
}

/// Walk the families in index order.  Graphics goes to the first family with the graphics bit, and
/// presentation to the first family `presents` accepts.  First match, not best match.  Stops once
/// both are known.  Completeness is the caller's question.
pub fn scan_queue_families<F>(
    families: &[QueueFamilyRecord],
    mut presents: F,
) -> Result<QueueFamilyIndices, VulkanError>
where
    F: FnMut(u32) -> Result<bool, VulkanError>,
{
    let mut indices = QueueFamilyIndices::default();

    for family in families {
        if indices.graphics.is_none() && family.supports(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(family.index);
        }
        if indices.present.is_none() && family.queue_count > 0 && presents(family.index)? {
            indices.present = Some(family.index);
        }
        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

pub fn resolve_queue_families<P: Prober + ?Sized>(
    prober: &P,
    device: &DeviceCandidate,
    surface: vk::SurfaceKHR,
) -> Result<ResolvedQueueFamilies, VulkanError> {
    scan_queue_families(&device.queue_families, |family| {
        prober.presentation_support(device.handle, family, surface)
    })?
    .complete()
}

/// Queue handles for a bound device.  The device owns the queues, so there is nothing to destroy.
pub struct Queues {
    graphics: vk::Queue,
    present: vk::Queue,
    pub families: ResolvedQueueFamilies,
}

impl Queues {
    /// Fetch queue 0 of each distinct family.  Aliased roles share one handle.
    pub fn new(device: &ash::Device, families: ResolvedQueueFamilies) -> Self {
        let graphics = unsafe { device.get_device_queue(families.graphics, 0) };
        let present = if families.is_shared() {
            graphics
        } else {
            unsafe { device.get_device_queue(families.present, 0) }
        };
        Queues {
            graphics,
            present,
            families,
        }
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present
    }
}
