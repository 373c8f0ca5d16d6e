use crate::domain::view::HeatmapScale;
use crate::domain::clock::DEFAULT_TIMEZONE;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSettings,
    pub refresh: RefreshSettings,
    pub window: WindowSettings,
    pub heatmap: HeatmapSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub tag: Option<String>,
    pub page_limit: u32,
    pub max_pages: u32,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.quantum.hackerban.de/v2".to_string(),
            tag: None,
            page_limit: 100,
            max_pages: 1000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshSettings {
    pub interval_secs: u64,
    /// Reload device metadata on every refresh instead of only while none are known
    pub reload_devices: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            reload_devices: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowSettings {
    pub timezone: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapMode {
    Normalized,
    Raw,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HeatmapSettings {
    pub mode: HeatmapMode,
    pub min_temp: f64,
    pub max_temp: f64,
}

impl Default for HeatmapSettings {
    fn default() -> Self {
        Self {
            mode: HeatmapMode::Normalized,
            min_temp: -10.0,
            max_temp: 40.0,
        }
    }
}

impl HeatmapSettings {
    pub fn scale(&self) -> HeatmapScale {
        match self.mode {
            HeatmapMode::Raw => HeatmapScale::Raw,
            HeatmapMode::Normalized => HeatmapScale::Normalized {
                min: self.min_temp,
                max: self.max_temp,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Load `config/sensormap.*`, overridden by `SENSORMAP__SECTION__KEY` variables
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/sensormap").required(false))
        .add_source(
            config::Environment::with_prefix("SENSORMAP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.api.page_limit == 0 {
            anyhow::bail!("api.page_limit must be positive");
        }
        if self.api.max_pages == 0 {
            anyhow::bail!("api.max_pages must be positive");
        }
        if self.refresh.interval_secs == 0 {
            anyhow::bail!("refresh.interval_secs must be positive");
        }
        if self.heatmap.mode == HeatmapMode::Normalized
            && self.heatmap.max_temp <= self.heatmap.min_temp
        {
            anyhow::bail!(
                "heatmap.max_temp ({}) must exceed heatmap.min_temp ({})",
                self.heatmap.max_temp,
                self.heatmap.min_temp
            );
        }
        Ok(())
    }
}
