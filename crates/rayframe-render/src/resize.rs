// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{HostWindow, RenderSize};

/// Device-side half of swapchain recreation.
pub trait Rebuild {
    /// Blocks until every queue is idle.
    fn wait_idle(&mut self) -> Result<()>;

    /// Destroys the old present chain and builds a new one for `size`.
    /// Returns the new swapchain image count, or `None` when the surface
    /// itself reports a zero extent and nothing could be built.
    fn rebuild(&mut self, size: RenderSize) -> Result<Option<usize>>;
}

/// Tears down and rebuilds everything derived from the swapchain. Frame slots
/// are not touched.
#[derive(Debug, Default)]
pub struct ResizeCoordinator {
    last_size: Option<RenderSize>,
    recreations: u64,
}

impl ResizeCoordinator {
    pub fn new(initial: RenderSize) -> Self {
        Self {
            last_size: Some(initial),
            recreations: 0,
        }
    }

    /// Polled resize detection: true if the window size differs from the size
    /// the current swapchain was built for.
    pub fn size_changed(&self, window: &dyn HostWindow) -> bool {
        let now = window.framebuffer_size();
        self.last_size.is_some_and(|last| last != now)
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn last_size(&self) -> Option<RenderSize> {
        self.last_size
    }

    /// Must only be called between frames. Waits while the window or the
    /// surface is minimized, then idles the device and rebuilds at the
    /// re-queried size.
    pub fn recreate<R: Rebuild + ?Sized>(
        &mut self,
        gpu: &mut R,
        window: &dyn HostWindow,
    ) -> Result<usize> {
        let (size, images) = loop {
            let mut size = window.framebuffer_size();
            if size.is_zero() {
                debug!("window minimized, waiting for a drawable size");
            }
            while size.is_zero() {
                window.wait_events();
                size = window.framebuffer_size();
            }

            gpu.wait_idle().context("wait_idle before swapchain rebuild")?;
            match gpu.rebuild(size).context("swapchain rebuild")? {
                Some(images) => break (size, images),
                None => {
                    // window has a size but the surface does not yet
                    debug!("surface extent is 0x0, waiting");
                    window.wait_events();
                }
            }
        };

        self.last_size = Some(size);
        self.recreations += 1;
        info!(
            "swapchain recreated ({}x{}, {} images, #{})",
            size.width, size.height, images, self.recreations
        );
        Ok(images)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Window double: yields queued sizes, then repeats the last one.
    pub(crate) struct ScriptedWindow {
        sizes: RefCell<VecDeque<RenderSize>>,
        pub(crate) waits: Cell<u32>,
    }

    impl ScriptedWindow {
        pub(crate) fn new(sizes: &[RenderSize]) -> Self {
            Self {
                sizes: RefCell::new(sizes.iter().copied().collect()),
                waits: Cell::new(0),
            }
        }

        pub(crate) fn set(&self, size: RenderSize) {
            let mut q = self.sizes.borrow_mut();
            q.clear();
            q.push_back(size);
        }
    }

    impl HostWindow for ScriptedWindow {
        fn framebuffer_size(&self) -> RenderSize {
            let mut q = self.sizes.borrow_mut();
            if q.len() > 1 {
                q.pop_front().unwrap()
            } else {
                *q.front().unwrap()
            }
        }

        fn wait_events(&self) {
            self.waits.set(self.waits.get() + 1);
        }
    }

    #[derive(Default)]
    struct CountingRebuild {
        idles: u32,
        built: Vec<RenderSize>,
        /// Attempts that find the surface at 0x0 before it recovers.
        zero_surface: u32,
    }

    impl Rebuild for CountingRebuild {
        fn wait_idle(&mut self) -> Result<()> {
            self.idles += 1;
            Ok(())
        }

        fn rebuild(&mut self, size: RenderSize) -> Result<Option<usize>> {
            assert!(!size.is_zero(), "rebuild with zero extent");
            if self.zero_surface > 0 {
                self.zero_surface -= 1;
                return Ok(None);
            }
            self.built.push(size);
            Ok(Some(3))
        }
    }

    #[test]
    fn zero_extent_polls_until_drawable() {
        let window = ScriptedWindow::new(&[
            RenderSize::new(0, 0),
            RenderSize::new(800, 0),
            RenderSize::new(800, 600),
        ]);
        let mut gpu = CountingRebuild::default();
        let mut coord = ResizeCoordinator::new(RenderSize::new(640, 480));

        let images = coord.recreate(&mut gpu, &window).unwrap();

        assert_eq!(images, 3);
        assert_eq!(window.waits.get(), 2);
        assert_eq!(gpu.idles, 1);
        assert_eq!(gpu.built, vec![RenderSize::new(800, 600)]);
        assert_eq!(coord.last_size(), Some(RenderSize::new(800, 600)));
    }

    #[test]
    fn size_is_requeried_not_taken_from_notification() {
        let window = ScriptedWindow::new(&[RenderSize::new(1024, 768)]);
        let mut gpu = CountingRebuild::default();
        let mut coord = ResizeCoordinator::new(RenderSize::new(640, 480));
        assert!(coord.size_changed(&window));
        coord.recreate(&mut gpu, &window).unwrap();
        assert!(!coord.size_changed(&window));
        assert_eq!(coord.recreations(), 1);
    }

    #[test]
    fn zero_surface_extent_waits_instead_of_failing() {
        let window = ScriptedWindow::new(&[RenderSize::new(800, 600)]);
        let mut gpu = CountingRebuild {
            zero_surface: 2,
            ..CountingRebuild::default()
        };
        let mut coord = ResizeCoordinator::new(RenderSize::new(640, 480));

        let images = coord.recreate(&mut gpu, &window).unwrap();

        assert_eq!(images, 3);
        assert_eq!(window.waits.get(), 2);
        assert_eq!(gpu.built, vec![RenderSize::new(800, 600)]);
        assert_eq!(coord.recreations(), 1);
    }

    struct FailingRebuild;

    impl Rebuild for FailingRebuild {
        fn wait_idle(&mut self) -> Result<()> {
            Ok(())
        }

        fn rebuild(&mut self, _size: RenderSize) -> Result<Option<usize>> {
            anyhow::bail!("out of device memory")
        }
    }

    #[test]
    fn rebuild_failure_propagates_and_keeps_old_size() {
        let window = ScriptedWindow::new(&[RenderSize::new(300, 200)]);
        let mut coord = ResizeCoordinator::new(RenderSize::new(640, 480));
        let err = coord.recreate(&mut FailingRebuild, &window).unwrap_err();
        assert!(format!("{err:#}").contains("out of device memory"));
        assert_eq!(coord.last_size(), Some(RenderSize::new(640, 480)));
        assert_eq!(coord.recreations(), 0);
    }
}
