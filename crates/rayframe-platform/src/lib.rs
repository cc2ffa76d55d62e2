// SPDX-License-Identifier: CEPL-1.0
//! winit glue. The app reaches winit through this crate.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rayframe_render::{HostWindow, RenderSize};
use tracing::trace;
use winit::dpi::PhysicalSize;
use winit::window::Window;

pub use winit;

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

/// [`HostWindow`] over a winit window.
///
/// winit delivers events only from the event loop, so the idle wait used
/// while minimized is a plain sleep followed by a fresh size query.
#[derive(Clone)]
pub struct WinitHost {
    window: Arc<Window>,
    poll: Duration,
}

impl WinitHost {
    pub fn new(window: Arc<Window>, poll: Duration) -> Self {
        Self { window, poll }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl HostWindow for WinitHost {
    fn framebuffer_size(&self) -> RenderSize {
        render_size(self.window.inner_size())
    }

    fn wait_events(&self) {
        trace!("window minimized, sleeping {:?}", self.poll);
        std::thread::sleep(self.poll);
    }
}

pub fn create_window(
    event_loop: &winit::event_loop::ActiveEventLoop,
    title: &str,
    size: RenderSize,
) -> Result<Arc<Window>> {
    let attrs = Window::default_attributes()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(size.width.max(1), size.height.max(1)));
    let window = event_loop
        .create_window(attrs)
        .context("create_window")?;
    Ok(Arc::new(window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_converts_verbatim() {
        let s = render_size(PhysicalSize::new(1280, 0));
        assert_eq!(s, RenderSize::new(1280, 0));
        assert!(s.is_zero());
    }
}
