// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Vulkan
//!
//! Everything that has to happen once before the first frame: find a GPU worth using, find queues
//! that can draw and present, bind a logical device, and agree on a swapchain with the surface.
//!
//! Stages, in the order they run:
//!
//! - `probe`: read-only capability queries (`Prober`, `DeviceCandidate`)
//! - `select`: hard suitability filter, then scoring (`select_best_device`)
//! - `queue`: graphics / presentation family resolution (`resolve_queue_families`)
//! - `device`: logical device and queue handles (`create_execution_context`)
//! - `swapchain`: format, mode, extent, and count negotiation, then images and views
//!   (`negotiate_swap_config`, `provision_images`)
//!
//! `instance` covers the loader, validation layers, and the debug messenger.  `context` strings the
//! stages together and owns the results.  Nothing here logs through a global; callers hand in a
//! `LogSink` and, for fatal paths, a `FatalReporter`.

pub mod context;
pub mod device;
pub mod instance;
pub mod probe;
pub mod queue;
pub mod report;
pub mod select;
pub mod swapchain;

use ash::vk;

pub mod prelude {
    pub use super::VulkanError;
    pub use crate::report::{FatalReporter, LogSink};
}

#[derive(thiserror::Error, Debug)]
pub enum VulkanError {
    #[error("platform query failed: {what}: {result}")]
    PlatformQuery {
        what: &'static str,
        result: vk::Result,
    },

    #[error("no suitable physical device")]
    NoSuitableDevice,

    #[error("queue families incomplete: graphics {graphics:?}, present {present:?}")]
    IncompleteQueueFamilies {
        graphics: Option<u32>,
        present: Option<u32>,
    },

    #[error("logical device creation failed: {0}")]
    DeviceCreation(vk::Result),

    #[error("swapchain creation failed: {0}")]
    SwapchainCreation(vk::Result),

    #[error("image view creation failed: {0}")]
    ImageViewCreation(vk::Result),

    #[error("validation layer not available: {0}")]
    UnsupportedValidationLayer(String),

    #[error("surface advertises no formats")]
    InadequateSurface,

    #[error("failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("instance creation failed: {0}")]
    InstanceCreation(vk::Result),

    #[error("debug messenger creation failed: {0}")]
    DebugMessengerCreation(vk::Result),

    #[error("surface creation failed: {0}")]
    SurfaceCreation(vk::Result),

    #[cfg(feature = "window")]
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
}

impl VulkanError {
    /// Shorthand for `map_err` on enumeration calls.
    pub(crate) fn query(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| VulkanError::PlatformQuery { what, result }
    }
}
