use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub generation: GenerationConfig,
    pub rollup: RollupConfig,
    pub simulator: SimulatorConfig,
    pub layout: LayoutConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    pub interval_seconds: u64,
    pub idle_draw_min_w: f64,
    pub idle_draw_max_w: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub peak_kw: f64,
    pub noise_kw: f64,
    pub sunrise_hour: u32,
    pub sunset_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollupConfig {
    pub delay_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    pub base_url: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    pub path: String,
    pub homes: u32,
    pub start_unlocked: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    pub directory: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("HEM__").split("__"));
        Ok(figment.extract()?)
    }
}
