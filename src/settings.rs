// ============================================================================
// ENGINE SETTINGS: persisted key=value configuration
// ============================================================================

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ops::adjustments::{Adjustment, DEFAULT_PIPELINE, parse_pipeline};
use crate::gpu::renderer::DEFAULT_CLEAR_COLOR;

const FILE_NAME: &str = "lumafe_settings.cfg";

/// Which backend the binary should open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendChoice {
    /// wgpu, falling back to the CPU renderer when no adapter exists.
    Auto,
    Gpu,
    Cpu,
}

impl BackendChoice {
    fn as_str(self) -> &'static str {
        match self {
            BackendChoice::Auto => "auto",
            BackendChoice::Gpu => "gpu",
            BackendChoice::Cpu => "cpu",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub backend: BackendChoice,
    /// "high performance" or "low power".
    pub preferred_gpu: String,
    pub modules: Vec<Adjustment>,
    pub clear_color: [f32; 4],
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub wheel_zoom_factor: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            preferred_gpu: "high performance".to_string(),
            modules: DEFAULT_PIPELINE.to_vec(),
            clear_color: DEFAULT_CLEAR_COLOR,
            viewport_width: 800,
            viewport_height: 600,
            wheel_zoom_factor: 1.1,
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/lumafe/lumafe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\LumaFE\lumafe_settings.cfg
    /// On macOS:   ~/Library/Application Support/LumaFE/lumafe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("lumafe");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(FILE_NAME));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("LumaFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(FILE_NAME));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("LumaFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(FILE_NAME));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(FILE_NAME)))
        }
    }

    /// Load from the default path; defaults if the file is missing.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Parse `key=value` lines. Unknown keys and malformed values keep their
    /// defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "backend" => {
                    s.backend = match val {
                        "gpu" => BackendChoice::Gpu,
                        "cpu" => BackendChoice::Cpu,
                        _ => BackendChoice::Auto,
                    };
                }
                "preferred_gpu" => {
                    s.preferred_gpu = val.to_string();
                }
                "modules" => {
                    s.modules = parse_pipeline(val);
                }
                "clear_color" => {
                    if let Some(c) = str_to_color(val) {
                        s.clear_color = c;
                    }
                }
                "viewport_width" => {
                    s.viewport_width = val.parse().ok().filter(|v| *v > 0).unwrap_or(s.viewport_width);
                }
                "viewport_height" => {
                    s.viewport_height = val.parse().ok().filter(|v| *v > 0).unwrap_or(s.viewport_height);
                }
                "wheel_zoom_factor" => {
                    s.wheel_zoom_factor = val
                        .parse::<f32>()
                        .ok()
                        .filter(|v| v.is_finite() && *v > 1.0)
                        .unwrap_or(s.wheel_zoom_factor);
                }
                _ => {
                    crate::log_warn!("Settings: unknown key '{}' ignored", key);
                }
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        let modules: Vec<&str> = self.modules.iter().map(|m| m.name()).collect();
        format!(
            "backend={}\n\
             preferred_gpu={}\n\
             modules={}\n\
             clear_color={}\n\
             viewport_width={}\n\
             viewport_height={}\n\
             wheel_zoom_factor={}\n",
            self.backend.as_str(),
            self.preferred_gpu,
            modules.join(","),
            color_to_str(self.clear_color),
            self.viewport_width,
            self.viewport_height,
            self.wheel_zoom_factor,
        )
    }
}

/// Serialize a colour as "r,g,b,a" floats.
fn color_to_str(c: [f32; 4]) -> String {
    format!("{},{},{},{}", c[0], c[1], c[2], c[3])
}

fn str_to_color(s: &str) -> Option<[f32; 4]> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut c = [0.0; 4];
    for (dst, p) in c.iter_mut().zip(parts) {
        let v = p.trim().parse::<f32>().ok()?;
        if !(0.0..=1.0).contains(&v) {
            return None;
        }
        *dst = v;
    }
    Some(c)
}
