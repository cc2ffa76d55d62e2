// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 1280,
            height: 720,
            title: "rayframe".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_vsync")]
    pub vsync: bool,
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    #[serde(default = "default_minimized_poll_ms")]
    pub minimized_poll_ms: u64,
    #[serde(default = "default_overlay")]
    pub overlay: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: default_vsync(),
            present_mode: PresentModeCfg::default(),
            minimized_poll_ms: default_minimized_poll_ms(),
            overlay: default_overlay(),
        }
    }
}

/// Preferred mode while vsync is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_vsync() -> bool {
    true
}
fn default_minimized_poll_ms() -> u64 {
    50
}
fn default_overlay() -> bool {
    true
}

/// A missing file is normal; an unreadable or invalid one is reported and
/// replaced by defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => {
                info!("config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("invalid config {}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppCfg::default(),
        Err(e) => {
            warn!("cannot read {}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: AppCfg = toml::from_str("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.render.present_mode, PresentModeCfg::Mailbox);
        assert_eq!(cfg.window.width, 1280);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [window]
            title = "demo"

            [render]
            vsync = false
            present_mode = "fifo"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.window.height, 720);
        assert!(!cfg.render.vsync);
        assert_eq!(cfg.render.present_mode, PresentModeCfg::Fifo);
        assert_eq!(cfg.render.minimized_poll_ms, 50);
        assert!(cfg.render.overlay);
    }

    #[test]
    fn unknown_present_mode_is_rejected() {
        let r = toml::from_str::<AppCfg>("[render]\npresent_mode = \"immediate\"\n");
        assert!(r.is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = load_cfg(Path::new("/definitely/not/here/rayframe.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
