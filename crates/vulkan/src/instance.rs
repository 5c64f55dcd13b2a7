// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Instance
//!
//! Loader, instance, validation layers, and the debug messenger.  Validation is opt-in per run; the
//! messenger only exists when it is on.

use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::Arc;

use ash::vk;
use log::Level;

use crate::prelude::*;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub const ENGINE_NAME: &CStr = c"kiln";

#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub app_name: CString,
    pub validation: bool,
    /// Whatever the windowing system needs to create a surface.
    pub window_extensions: Vec<&'static CStr>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: CString::from(c"kiln"),
            validation: cfg!(debug_assertions),
            window_extensions: Vec::new(),
        }
    }
}

/// Window extensions, plus debug utils when validating.
pub fn required_extensions(window_extensions: &[&'static CStr], validation: bool) -> Vec<&'static CStr> {
    let mut extensions = window_extensions.to_vec();
    if validation && !extensions.contains(&ash::ext::debug_utils::NAME) {
        extensions.push(ash::ext::debug_utils::NAME);
    }
    extensions
}

/// First requested layer that is not available.
pub fn find_missing_layer<'a>(available: &[&CStr], requested: &[&'a CStr]) -> Option<&'a CStr> {
    requested
        .iter()
        .copied()
        .find(|layer| !available.contains(layer))
}

pub fn check_validation_layer_support(
    entry: &ash::Entry,
    layers: &[&CStr],
) -> Result<(), VulkanError> {
    let properties = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(VulkanError::query("instance layers"))?;
    let available: Vec<&CStr> = properties
        .iter()
        .map(|p| unsafe { CStr::from_ptr(p.layer_name.as_ptr()) })
        .collect();

    match find_missing_layer(&available, layers) {
        Some(missing) => Err(VulkanError::UnsupportedValidationLayer(
            missing.to_string_lossy().into_owned(),
        )),
        None => Ok(()),
    }
}

pub fn create_instance(
    entry: &ash::Entry,
    config: &InstanceConfig,
    log: &dyn LogSink,
) -> Result<ash::Instance, VulkanError> {
    let layers: Vec<*const c_char> = if config.validation {
        check_validation_layer_support(entry, &[VALIDATION_LAYER])?;
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let extensions: Vec<*const c_char> =
        required_extensions(&config.window_extensions, config.validation)
            .iter()
            .map(|e| e.as_ptr())
            .collect();

    let app_info = vk::ApplicationInfo::default()
        .application_name(&config.app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(VulkanError::InstanceCreation)?;

    log.info(&format!(
        "instance created with {} extension(s){}",
        extensions.len(),
        if config.validation {
            ", validation on"
        } else {
            ""
        }
    ));
    Ok(instance)
}

/// Each severity gets its own level.
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

    if severity.contains(Severity::ERROR) {
        Level::Error
    } else if severity.contains(Severity::WARNING) {
        Level::Warn
    } else if severity.contains(Severity::INFO) {
        Level::Info
    } else {
        Level::Debug
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || unsafe { (*data).p_message }.is_null() {
        return vk::FALSE;
    }
    let message = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    let level = severity_level(severity);

    if user.is_null() {
        log::log!(target: "kiln_vulkan::validation", level, "{message}");
    } else {
        // Points into the `Box` held by the `DebugMessenger`, which outlives the messenger.
        let sink = unsafe { &*(user as *const Arc<dyn LogSink>) };
        sink.log(level, &message);
    }
    vk::FALSE
}

/// Routes validation output into a `LogSink`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Stable address for the callback's user data.
    _sink: Box<Arc<dyn LogSink>>,
}

impl DebugMessenger {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, VulkanError> {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
        use vk::DebugUtilsMessageTypeFlagsEXT as Type;

        let sink = Box::new(log);
        let user = &*sink as *const Arc<dyn LogSink> as *mut c_void;

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(Severity::VERBOSE | Severity::WARNING | Severity::ERROR)
            .message_type(Type::GENERAL | Type::VALIDATION | Type::PERFORMANCE)
            .pfn_user_callback(Some(debug_callback))
            .user_data(user);

        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(VulkanError::DebugMessengerCreation)?;

        sink.info("debug messenger attached");
        Ok(Self {
            loader,
            messenger,
            _sink: sink,
        })
    }

    pub fn destroy(self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

    #[test]
    fn test_each_severity_has_its_own_level() {
        assert_eq!(severity_level(Severity::VERBOSE), Level::Debug);
        assert_eq!(severity_level(Severity::INFO), Level::Info);
        assert_eq!(severity_level(Severity::WARNING), Level::Warn);
        assert_eq!(severity_level(Severity::ERROR), Level::Error);
    }

    #[test]
    fn test_debug_utils_only_with_validation() {
        let window = [ash::khr::surface::NAME, ash::khr::xlib_surface::NAME];

        let plain = required_extensions(&window, false);
        assert_eq!(plain, window.to_vec());

        let validating = required_extensions(&window, true);
        assert_eq!(validating.len(), 3);
        assert_eq!(validating[2], ash::ext::debug_utils::NAME);
    }

    #[test]
    fn test_debug_utils_not_duplicated() {
        let window = [ash::khr::surface::NAME, ash::ext::debug_utils::NAME];
        assert_eq!(required_extensions(&window, true).len(), 2);
    }

    #[test]
    fn test_missing_layer_is_reported() {
        let available = [c"VK_LAYER_MESA_device_select", c"VK_LAYER_KHRONOS_validation"];
        assert_eq!(find_missing_layer(&available, &[VALIDATION_LAYER]), None);

        let available = [c"VK_LAYER_MESA_device_select"];
        assert_eq!(
            find_missing_layer(&available, &[VALIDATION_LAYER]),
            Some(VALIDATION_LAYER)
        );
        assert_eq!(find_missing_layer(&[], &[]), None);
    }
}
