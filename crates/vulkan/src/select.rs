// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Device Selection
//!
//! Two phases.  A hard filter decides whether a device *can* run us at all.  Only then does a score
//! decide which of the survivors we would *rather* run on.  Unsuitable devices never get a score.

use std::ffi::{CStr, CString};
use std::fmt;
use std::str::FromStr;

use ash::vk;

use crate::prelude::*;
use crate::probe::{DeviceCandidate, Prober};
use crate::queue;

/// Bonus for dedicated hardware.  Large enough that no realistic array layer limit can make up the
/// difference.
pub const DISCRETE_BONUS: u64 = 1000;

macro_rules! features {
    ($($variant:ident => $field:ident),* $(,)?) => {
        /// Device features that can be required.  Names match `vk::PhysicalDeviceFeatures` fields.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Feature {
            $($variant),*
        }

        impl Feature {
            pub const ALL: &'static [Feature] = &[$(Feature::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Feature::$variant => stringify!($field)),*
                }
            }

            pub fn supported_by(self, features: &vk::PhysicalDeviceFeatures) -> bool {
                match self {
                    $(Feature::$variant => features.$field == vk::TRUE),*
                }
            }

            pub fn enable(self, features: &mut vk::PhysicalDeviceFeatures) {
                match self {
                    $(Feature::$variant => features.$field = vk::TRUE),*
                }
            }
        }
    };
}

features! {
    GeometryShader => geometry_shader,
    TessellationShader => tessellation_shader,
    SamplerAnisotropy => sampler_anisotropy,
    FillModeNonSolid => fill_mode_non_solid,
    WideLines => wide_lines,
    LargePoints => large_points,
    MultiViewport => multi_viewport,
    IndependentBlend => independent_blend,
    DepthClamp => depth_clamp,
    ShaderFloat64 => shader_float64,
    ShaderInt64 => shader_int64,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown device feature: {0}")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownFeature(s.to_owned()))
    }
}

/// What a device must offer to be considered at all.
#[derive(Debug, Clone)]
pub struct Requirements {
    pub features: Vec<Feature>,
    pub extensions: Vec<CString>,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            features: vec![Feature::GeometryShader],
            extensions: vec![ash::khr::swapchain::NAME.to_owned()],
        }
    }
}

impl Requirements {
    /// Feature struct with exactly the required features switched on.
    pub fn enabled_features(&self) -> vk::PhysicalDeviceFeatures {
        let mut features = vk::PhysicalDeviceFeatures::default();
        for f in &self.features {
            f.enable(&mut features);
        }
        features
    }

    pub fn missing_features(&self, available: &vk::PhysicalDeviceFeatures) -> Vec<Feature> {
        self.features
            .iter()
            .copied()
            .filter(|f| !f.supported_by(available))
            .collect()
    }

    /// Required extensions the candidate does not advertise.
    pub fn missing_extensions<'a>(&'a self, candidate: &DeviceCandidate) -> Vec<&'a CStr> {
        self.extensions
            .iter()
            .map(CString::as_c_str)
            .filter(|name| !candidate.supports_extension(name))
            .collect()
    }
}

/// Why a candidate failed the hard filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingFeatures(Vec<Feature>),
    MissingExtensions(Vec<CString>),
    IncompleteQueueFamilies,
    InadequateSurface,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingFeatures(missing) => {
                let names: Vec<_> = missing.iter().map(|f| f.name()).collect();
                write!(f, "missing features [{}]", names.join(", "))
            }
            Rejection::MissingExtensions(missing) => {
                let names: Vec<_> = missing.iter().map(|e| e.to_string_lossy()).collect();
                write!(f, "missing extensions [{}]", names.join(", "))
            }
            Rejection::IncompleteQueueFamilies => {
                f.write_str("no queue families for both graphics and presentation")
            }
            Rejection::InadequateSurface => f.write_str("surface has no formats or present modes"),
        }
    }
}

/// The hard filter.  `Ok(Err(_))` is a rejected device; `Err(_)` is a failed query.
pub fn check_suitability<P: Prober + ?Sized>(
    prober: &P,
    candidate: &DeviceCandidate,
    requirements: &Requirements,
    surface: vk::SurfaceKHR,
) -> Result<Result<(), Rejection>, VulkanError> {
    let missing = requirements.missing_features(&candidate.features);
    if !missing.is_empty() {
        return Ok(Err(Rejection::MissingFeatures(missing)));
    }

    let missing = requirements.missing_extensions(candidate);
    if !missing.is_empty() {
        let missing = missing.into_iter().map(CStr::to_owned).collect();
        return Ok(Err(Rejection::MissingExtensions(missing)));
    }

    let indices = queue::scan_queue_families(&candidate.queue_families, |family| {
        prober.presentation_support(candidate.handle, family, surface)
    })?;
    if !indices.is_complete() {
        return Ok(Err(Rejection::IncompleteQueueFamilies));
    }

    if !prober.surface_support(candidate.handle, surface)?.is_adequate() {
        return Ok(Err(Rejection::InadequateSurface));
    }

    Ok(Ok(()))
}

/// Desirability of a device that already passed the filter.
pub fn score(candidate: &DeviceCandidate) -> u64 {
    let bonus = if candidate.properties.is_discrete() {
        DISCRETE_BONUS
    } else {
        0
    };
    bonus + u64::from(candidate.properties.max_image_array_layers)
}

/// Highest scoring suitable device.  Ties go to whichever was enumerated first.
pub fn select_best_device<P: Prober + ?Sized>(
    prober: &P,
    candidates: Vec<DeviceCandidate>,
    requirements: &Requirements,
    surface: vk::SurfaceKHR,
    log: &dyn LogSink,
) -> Result<DeviceCandidate, VulkanError> {
    let mut best: Option<(u64, DeviceCandidate)> = None;

    for candidate in candidates {
        if let Err(rejection) = check_suitability(prober, &candidate, requirements, surface)? {
            log.info(&format!("rejected device {}: {rejection}", candidate.name()));
            continue;
        }

        let score = score(&candidate);
        log.info(&format!("suitable device {} scored {score}", candidate.name()));
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, candidate));
        }
    }

    let (score, chosen) = best.ok_or(VulkanError::NoSuitableDevice)?;
    log.info(&format!(
        "selected device {} ({score}), Vulkan {}",
        chosen.name(),
        chosen.properties.api_version_string()
    ));
    Ok(chosen)
}
