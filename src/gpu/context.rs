// ============================================================================
// GPU CONTEXT: wgpu Device, Queue, and adapter initialization
// ============================================================================

use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Core wgpu resources shared by every pipeline of the engine.
/// Headless: there is no surface, all drawing goes to offscreen targets.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
}

impl GpuContext {
    /// Tries a hardware adapter first, then wgpu's fallback adapter.
    /// Fails with `ResourceUnavailable` when neither can be opened.
    pub fn new(preferred_gpu: &str) -> Result<Self> {
        match pollster::block_on(Self::new_async(preferred_gpu, false)) {
            Ok(ctx) => Ok(ctx),
            Err(e) => {
                crate::log_warn!("GPU: hardware adapter unavailable ({e}), trying fallback adapter");
                pollster::block_on(Self::new_async(preferred_gpu, true))
            }
        }
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power = match preferred_gpu.to_lowercase().as_str() {
            "low power" | "integrated" => wgpu::PowerPreference::LowPower,
            _ => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power,
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await
            .ok_or_else(|| EngineError::ResourceUnavailable("no wgpu adapter".into()))?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("LumaFE GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        max_texture_array_layers: limits.max_texture_array_layers,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .map_err(|e| EngineError::ResourceUnavailable(format!("request_device: {e}")))?;

        crate::log_info!(
            "GPU: using '{}' (max texture {}px)",
            adapter_name,
            limits.max_texture_dimension_2d
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
        })
    }

    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    /// Submit a single encoder's commands.
    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}
