// SPDX-License-Identifier: CEPL-1.0
use std::collections::VecDeque;

use ash::vk;

/// What an overlay may record into: the frame's command buffer while the
/// scene render pass is still open, after the scene draw.
#[derive(Clone, Copy, Debug)]
pub struct OverlayTarget {
    pub command_buffer: vk::CommandBuffer,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub image_index: u32,
    /// Time since the previous frame started, 0 on the first frame.
    pub delta_secs: f32,
}

pub trait Overlay {
    fn record(&mut self, device: &ash::Device, target: &OverlayTarget);
}

/// Bar graph of recent frame times in the bottom-left corner, drawn with
/// attachment clears so it needs no pipeline of its own.
pub struct FrameTimeBar {
    history: VecDeque<f32>,
    capacity: usize,
    color: [f32; 4],
}

impl FrameTimeBar {
    const BAR_WIDTH: u32 = 3;
    const MAX_HEIGHT: u32 = 60;
    /// Frame time mapped to a full-height bar.
    const FULL_SCALE_MS: f32 = 33.3;

    pub fn new(capacity: usize, color: [f32; 4]) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            color,
        }
    }

    pub fn push_ms(&mut self, ms: f32) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(ms);
    }

    /// Records one frame delta. The first frame has none to report.
    pub fn observe(&mut self, delta_secs: f32) {
        if delta_secs > 0.0 {
            self.push_ms(delta_secs * 1000.0);
        }
    }

    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    /// One rectangle per sample, oldest on the left, clipped to `extent`.
    pub fn bar_rects(&self, extent: vk::Extent2D) -> Vec<vk::ClearRect> {
        let max_h = Self::MAX_HEIGHT.min(extent.height);
        self.history
            .iter()
            .enumerate()
            .filter_map(|(i, &ms)| {
                let x = i as u32 * Self::BAR_WIDTH;
                if x + Self::BAR_WIDTH > extent.width {
                    return None;
                }
                let frac = (ms / Self::FULL_SCALE_MS).clamp(0.0, 1.0);
                let h = ((frac * max_h as f32).round() as u32).max(1).min(max_h);
                if h == 0 {
                    return None;
                }
                Some(vk::ClearRect {
                    rect: vk::Rect2D {
                        offset: vk::Offset2D {
                            x: x as i32,
                            y: (extent.height - h) as i32,
                        },
                        extent: vk::Extent2D {
                            width: Self::BAR_WIDTH - 1,
                            height: h,
                        },
                    },
                    base_array_layer: 0,
                    layer_count: 1,
                })
            })
            .collect()
    }
}

impl Overlay for FrameTimeBar {
    fn record(&mut self, device: &ash::Device, target: &OverlayTarget) {
        self.observe(target.delta_secs);
        let rects = self.bar_rects(target.extent);
        if rects.is_empty() {
            return;
        }
        let clear = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.color,
                },
            },
        };
        unsafe {
            device.cmd_clear_attachments(target.command_buffer, std::slice::from_ref(&clear), &rects)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn history_is_bounded() {
        let mut bar = FrameTimeBar::new(3, [1.0; 4]);
        for ms in [1.0, 2.0, 3.0, 4.0] {
            bar.push_ms(ms);
        }
        assert_eq!(bar.history().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn frame_deltas_become_milliseconds() {
        let mut bar = FrameTimeBar::new(8, [1.0; 4]);
        bar.observe(0.0);
        bar.observe(0.016);
        bar.observe(0.033);
        let ms: Vec<_> = bar.history().collect();
        assert_eq!(ms.len(), 2);
        assert!((ms[0] - 16.0).abs() < 1e-3);
        assert!((ms[1] - 33.0).abs() < 1e-3);
    }

    #[test]
    fn bars_scale_and_sit_on_the_bottom_edge() {
        let mut bar = FrameTimeBar::new(4, [1.0; 4]);
        bar.push_ms(FrameTimeBar::FULL_SCALE_MS * 2.0);
        bar.push_ms(FrameTimeBar::FULL_SCALE_MS / 2.0);
        bar.push_ms(0.0);
        let rects = bar.bar_rects(extent(800, 600));
        let heights: Vec<_> = rects.iter().map(|r| r.rect.extent.height).collect();
        assert_eq!(heights, vec![60, 30, 1]);
        for r in &rects {
            assert_eq!(r.rect.offset.y as u32 + r.rect.extent.height, 600);
        }
        assert_eq!(rects[1].rect.offset.x, 3);
    }

    #[test]
    fn bars_never_leave_a_tiny_framebuffer() {
        let mut bar = FrameTimeBar::new(10, [1.0; 4]);
        for _ in 0..10 {
            bar.push_ms(100.0);
        }
        let rects = bar.bar_rects(extent(7, 20));
        assert_eq!(rects.len(), 2);
        for r in &rects {
            assert!(r.rect.offset.x as u32 + r.rect.extent.width <= 7);
            assert_eq!(r.rect.extent.height, 20);
        }
    }
}
