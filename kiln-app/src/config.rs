// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Config
//!
//! Optional TOML file, then command line overrides.  Strings stay strings until
//! `context_config` turns them into what the Vulkan side wants, which is where bad names are caught.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use ash::vk;
use serde::Deserialize;

use kiln_vulkan::context::ContextConfig;
use kiln_vulkan::instance::InstanceConfig;
use kiln_vulkan::select::{Feature, Requirements, UnknownFeature};
use kiln_vulkan::swapchain::SwapPreferences;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Feature(#[from] UnknownFeature),

    #[error("extension name contains a NUL byte: {0:?}")]
    ExtensionName(String),

    #[error("title contains a NUL byte: {0:?}")]
    Title(String),
}

/// Preferred present mode.  Negotiation falls back to FIFO when the surface lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum PresentMode {
    Mailbox,
    Fifo,
    FifoRelaxed,
    Immediate,
}

impl From<PresentMode> for vk::PresentModeKHR {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub validation: bool,
    pub present_mode: PresentMode,
    /// `vk::PhysicalDeviceFeatures` field names.
    pub features: Vec<String>,
    pub extensions: Vec<String>,
    /// `env_logger` filter.  `RUST_LOG` applies when unset.
    pub log: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "kiln".to_owned(),
            width: 800,
            height: 600,
            validation: cfg!(debug_assertions),
            present_mode: PresentMode::Mailbox,
            features: vec![Feature::GeometryShader.name().to_owned()],
            extensions: vec![ash::khr::swapchain::NAME.to_string_lossy().into_owned()],
            log: None,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn context_config(&self) -> Result<ContextConfig, ConfigError> {
        let features = self
            .features
            .iter()
            .map(|f| f.parse::<Feature>())
            .collect::<Result<Vec<_>, _>>()?;
        let extensions = self
            .extensions
            .iter()
            .map(|e| CString::new(e.as_str()).map_err(|_| ConfigError::ExtensionName(e.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let app_name =
            CString::new(self.title.as_str()).map_err(|_| ConfigError::Title(self.title.clone()))?;

        Ok(ContextConfig {
            instance: InstanceConfig {
                app_name,
                validation: self.validation,
                ..InstanceConfig::default()
            },
            requirements: Requirements {
                features,
                extensions,
            },
            swap: SwapPreferences {
                present_mode: self.present_mode.into(),
                extent_hint: vk::Extent2D {
                    width: self.width,
                    height: self.height,
                },
            },
        })
    }
}
