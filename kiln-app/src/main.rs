// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opens one window, negotiates a Vulkan context for it, and tears everything down on close.  No
//! frames are drawn.

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    event_loop::{ControlFlow, EventLoop},
    keyboard as kb,
    window::Window,
};

use kiln_vulkan::context::{ContextConfig, VkContext};
use kiln_vulkan::prelude::*;
use kiln_vulkan::report::{AbortReporter, ExitReporter, FacadeSink};

use crate::config::{Config, ConfigError, PresentMode};
use crate::logging::LoggingConfig;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Vulkan: {0}")]
    Vulkan(#[from] VulkanError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("window: {0}")]
    Window(#[from] winit::error::OsError),
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Window and application title
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Enable the Khronos validation layer
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Disable the Khronos validation layer
    #[arg(long)]
    no_validation: bool,

    /// Preferred present mode
    #[arg(long, value_enum)]
    present_mode: Option<PresentMode>,

    /// Log filter in env_logger syntax
    #[arg(long)]
    log: Option<String>,
}

impl Args {
    /// Command line wins over the file.
    fn apply(&self, config: &mut Config) {
        if let Some(title) = &self.title {
            config.title = title.clone();
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if self.validation {
            config.validation = true;
        }
        if self.no_validation {
            config.validation = false;
        }
        if let Some(mode) = self.present_mode {
            config.present_mode = mode;
        }
        if let Some(log) = &self.log {
            config.log = Some(log.clone());
        }
    }
}

/// Debug builds abort so an attached debugger stops at the failure.
fn fatal_reporter(debug: bool) -> Box<dyn FatalReporter> {
    if debug {
        Box::new(AbortReporter)
    } else {
        Box::new(ExitReporter::default())
    }
}

struct App {
    config: Config,
    context_config: ContextConfig,

    // The context must go before the window it presents to.
    vk_context: Option<VkContext>,
    window: Option<Window>,
    failure: Option<AppError>,
}

impl App {
    fn new(config: Config, context_config: ContextConfig) -> Self {
        Self {
            config,
            context_config,
            vk_context: None,
            window: None,
            failure: None,
        }
    }

    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);
        let window = event_loop.create_window(attrs)?;

        let vk_context = VkContext::establish(
            &window,
            &self.context_config,
            Arc::new(FacadeSink),
            &*fatal_reporter(cfg!(debug_assertions)),
        )?;

        let images = &vk_context.images;
        log::info!(
            "ready on {}: {} image(s), {:?}, {:?}, {}x{}",
            vk_context.physical_device.name(),
            images.len(),
            images.config.format,
            images.config.present_mode,
            images.config.extent.width,
            images.config.extent.height,
        );

        self.vk_context = Some(vk_context);
        self.window = Some(window);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(vk_context) = self.vk_context.take() {
            vk_context.destroy();
            log::info!("context released");
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.failure.is_some() {
            return;
        }
        if let Err(e) = self.open(event_loop) {
            self.failure = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::KeyboardInput {
                device_id: _,
                event,
                is_synthetic: _,
            } => {
                if !event.repeat && event.state == winit::event::ElementState::Pressed {
                    match event.physical_key {
                        kb::PhysicalKey::Code(kb::KeyCode::KeyQ)
                        | kb::PhysicalKey::Code(kb::KeyCode::Escape) => {
                            self.close();
                            event_loop.exit();
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::Resized(size) => {
                let current = self
                    .vk_context
                    .as_ref()
                    .map(|c| c.images.config.extent);
                // NEXT re-run swap negotiation against fresh surface support
                if current.is_some_and(|e| e.width != size.width || e.height != size.height) {
                    log::warn!(
                        "surface is now {}x{}; swapchain re-negotiation is not implemented",
                        size.width,
                        size.height
                    );
                }
            }
            WindowEvent::CloseRequested => {
                self.close();
                event_loop.exit();
            }
            _ => (),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.close();
    }
}

fn main() -> Result<(), AppError> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);

    logging::init_logging(LoggingConfig {
        env_filter: config.log.clone(),
        ..Default::default()
    });
    let context_config = config.context_config()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    let mut app = App::new(config, context_config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
