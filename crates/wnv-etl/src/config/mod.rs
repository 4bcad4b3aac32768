use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::gdb::SpatialReference;
use crate::geocode::{NominatimConfig, DEFAULT_NOMINATIM_URL};
use crate::map::Renderer;
use crate::pipeline::analyze::DEFAULT_BUFFER_DISTANCE_FEET;
use crate::pipeline::finalize::DEFAULT_RESOLUTION;
use crate::pipeline::report::DEFAULT_REPORT_FIELDS;
use crate::pipeline::{
    AnalysisConfig, ExtractConfig, FinalizePlan, LayerStyle, LoadConfig, ReportConfig,
    TransformConfig, EXTRACTED_CSV, MAP_PDF, TARGET_REPORT_CSV, TRANSFORMED_CSV,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/wnvoutbreak.yaml";
pub const RUN_LOG_FILE: &str = "wnv.log";

/// Validated configuration shared by every stage.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Project directory; holds the run log.
    pub proj_dir: PathBuf,
    /// Directory for the CSV, report and PDF hand-off files.
    pub local_dir: PathBuf,
    pub remote_url: Url,
    pub gdb_path: PathBuf,
    /// Map project file.
    pub proj_loc: PathBuf,
    /// Validated `geocoder.base_url`.
    pub geocoder_url: Url,
    pub telemetry: TelemetryConfig,
    pub geocoder: GeocoderSettings,
    pub extract: ExtractSettings,
    pub transform: TransformSettings,
    pub load: LoadSettings,
    pub analysis: AnalysisSettings,
    pub report: ReportSettings,
    pub finalize: FinalizeSettings,
}

/// Tracing controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeocoderSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub throttle_ms: u64,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: "wnv-etl/0.1 (opt-out geocoder)".to_string(),
            timeout_secs: 10,
            throttle_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    pub timeout_secs: u64,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransformSettings {
    pub address_field: String,
    pub city_state: String,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            address_field: "address".to_string(),
            city_state: "Boulder, CO".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    pub feature_class: String,
    pub fields: Option<Vec<String>>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            feature_class: "Opt_Out_Address_Points".to_string(),
            fields: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub buffer_distance_feet: f64,
    pub buffer_class: String,
    pub high_risk_class: String,
    pub selection_class: String,
    pub address_class: String,
    pub target_class: String,
    pub keep_common: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            buffer_distance_feet: DEFAULT_BUFFER_DISTANCE_FEET,
            buffer_class: defaults.buffer_class,
            high_risk_class: defaults.high_risk_class,
            selection_class: defaults.selection_class,
            address_class: defaults.address_class,
            target_class: defaults.target_class,
            keep_common: defaults.keep_common,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub fields: Vec<String>,
    pub definition_query: Option<String>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            fields: DEFAULT_REPORT_FIELDS.iter().map(|f| f.to_string()).collect(),
            definition_query: Some("Join_Count > 0".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StyleSettings {
    pub layer: String,
    pub renderer: Renderer,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FinalizeSettings {
    pub map: String,
    pub layout: String,
    pub subtitle_element: String,
    pub subtitle: Option<String>,
    pub spatial_reference: SpatialReference,
    pub add_layers: Option<Vec<String>>,
    pub styles: Option<Vec<StyleSettings>>,
    pub target_layer: Option<String>,
    pub definition_query: Option<String>,
    pub resolution: u32,
}

impl Default for FinalizeSettings {
    fn default() -> Self {
        Self {
            map: "Map".to_string(),
            layout: "Layout".to_string(),
            subtitle_element: "Subtitle".to_string(),
            subtitle: None,
            spatial_reference: SpatialReference::WebMercator,
            add_layers: None,
            styles: None,
            target_layer: None,
            definition_query: None,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

/// The YAML document as written; required keys are checked after env overrides.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    proj_dir: Option<String>,
    local_dir: Option<String>,
    remote_url: Option<String>,
    gdb_path: Option<String>,
    proj_loc: Option<String>,
    data_format: Option<String>,
    log_level: Option<String>,
    #[serde(default)]
    geocoder: GeocoderSettings,
    #[serde(default)]
    extract: ExtractSettings,
    #[serde(default)]
    transform: TransformSettings,
    #[serde(default)]
    load: LoadSettings,
    #[serde(default)]
    analysis: AnalysisSettings,
    #[serde(default)]
    report: ReportSettings,
    #[serde(default)]
    finalize: FinalizeSettings,
}

impl AppConfig {
    /// Loads `.env`, the YAML file and `WNV_*` overrides, then validates.
    ///
    /// `path` falls back to `WNV_CONFIG` and then [`DEFAULT_CONFIG_PATH`]. A missing default
    /// file is tolerated so the environment alone can configure a run; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("WNV_CONFIG").map(PathBuf::from));
        let raw = match explicit {
            Some(path) => read_raw(&path)?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if path.is_file() {
                    read_raw(&path)?
                } else {
                    RawConfig::default()
                }
            }
        };

        Self::from_raw(apply_env_overrides(raw))
    }

    /// Parses and validates a YAML document without consulting the environment.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yml::from_str(text).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let proj_dir = PathBuf::from(required("proj_dir", raw.proj_dir)?);
        let local_dir = PathBuf::from(required("local_dir", raw.local_dir)?);
        let remote_url = parse_http_url("remote_url", &required("remote_url", raw.remote_url)?)?;
        let gdb_path = PathBuf::from(required("gdb_path", raw.gdb_path)?);
        let proj_loc = PathBuf::from(required("proj_loc", raw.proj_loc)?);
        let geocoder_url = parse_http_url("geocoder.base_url", &raw.geocoder.base_url)?;

        if let Some(format) = raw.data_format.as_deref() {
            if !format.trim().eq_ignore_ascii_case("csv") {
                return Err(ConfigError::UnsupportedDataFormat(format.to_string()));
            }
        }
        if raw.geocoder.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "geocoder.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if raw.extract.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extract.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        let distance = raw.analysis.buffer_distance_feet;
        if !distance.is_finite() || distance <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "analysis.buffer_distance_feet",
                reason: format!("must be a positive number, got {distance}"),
            });
        }

        let log_level = raw
            .log_level
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            telemetry: TelemetryConfig {
                log_level,
                log_file: Some(proj_dir.join(RUN_LOG_FILE)),
            },
            proj_dir,
            local_dir,
            remote_url,
            gdb_path,
            proj_loc,
            geocoder_url,
            geocoder: raw.geocoder,
            extract: raw.extract,
            transform: raw.transform,
            load: raw.load,
            analysis: raw.analysis,
            report: raw.report,
            finalize: raw.finalize,
        })
    }

    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            remote_url: self.remote_url.clone(),
            destination: self.local_dir.join(EXTRACTED_CSV),
            timeout: Duration::from_secs(self.extract.timeout_secs),
        }
    }

    pub fn nominatim_config(&self) -> NominatimConfig {
        NominatimConfig {
            base_url: self.geocoder_url.clone(),
            user_agent: self.geocoder.user_agent.clone(),
            timeout: Duration::from_secs(self.geocoder.timeout_secs),
            throttle: Duration::from_millis(self.geocoder.throttle_ms),
        }
    }

    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig {
            input: self.local_dir.join(EXTRACTED_CSV),
            output: self.local_dir.join(TRANSFORMED_CSV),
            address_field: self.transform.address_field.clone(),
            city_state: self.transform.city_state.clone(),
        }
    }

    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            input: self.local_dir.join(TRANSFORMED_CSV),
            feature_class: self.load.feature_class.clone(),
            fields: self.load.fields.clone(),
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        let settings = &self.analysis;
        AnalysisConfig {
            points_class: self.load.feature_class.clone(),
            buffer_class: settings.buffer_class.clone(),
            high_risk_class: settings.high_risk_class.clone(),
            selection_class: settings.selection_class.clone(),
            address_class: settings.address_class.clone(),
            target_class: settings.target_class.clone(),
            buffer_distance_feet: settings.buffer_distance_feet,
            keep_common: settings.keep_common,
        }
    }

    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            feature_class: self.analysis.target_class.clone(),
            fields: self.report.fields.clone(),
            output: self.local_dir.join(TARGET_REPORT_CSV),
            definition_query: self.report.definition_query.clone(),
        }
    }

    /// Builds the finalize plan. `subtitle` and `output` override the configured values.
    pub fn finalize_plan(&self, subtitle: Option<String>, output: Option<PathBuf>) -> FinalizePlan {
        let settings = &self.finalize;
        let subtitle = subtitle
            .or_else(|| settings.subtitle.clone())
            .unwrap_or_default();
        let output = output.unwrap_or_else(|| self.local_dir.join(MAP_PDF));

        let mut plan = FinalizePlan::standard(subtitle, output);
        plan.subtitle_element = settings.subtitle_element.clone();
        plan.spatial_reference = settings.spatial_reference;
        plan.resolution = settings.resolution;

        let points = &self.load.feature_class;
        let selection = &self.analysis.selection_class;
        let targets = &self.analysis.target_class;
        plan.add_layers = settings
            .add_layers
            .clone()
            .unwrap_or_else(|| vec![points.clone(), selection.clone(), targets.clone()]);
        match &settings.styles {
            Some(styles) => {
                plan.styles = styles
                    .iter()
                    .map(|style| LayerStyle::new(style.layer.clone(), style.renderer.clone()))
                    .collect();
            }
            None => {
                // keep the standard symbology, following renamed feature classes
                for style in &mut plan.styles {
                    if style.layer == "Opt_Out_Address_Points" {
                        style.layer = points.clone();
                    } else if style.layer == "Final_Selection" {
                        style.layer = selection.clone();
                    }
                }
            }
        }
        plan.target_layer = settings
            .target_layer
            .clone()
            .unwrap_or_else(|| targets.clone());
        if let Some(query) = &settings.definition_query {
            plan.definition_query = query.clone();
        }
        plan
    }
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })
}

fn apply_env_overrides(mut raw: RawConfig) -> RawConfig {
    let overrides: [(&str, &mut Option<String>); 6] = [
        ("WNV_PROJ_DIR", &mut raw.proj_dir),
        ("WNV_LOCAL_DIR", &mut raw.local_dir),
        ("WNV_REMOTE_URL", &mut raw.remote_url),
        ("WNV_GDB_PATH", &mut raw.gdb_path),
        ("WNV_PROJ_LOC", &mut raw.proj_loc),
        ("WNV_LOG_LEVEL", &mut raw.log_level),
    ];
    for (name, slot) in overrides {
        if let Ok(value) = env::var(name) {
            *slot = Some(value);
        }
    }
    raw
}

fn parse_http_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme {
            key,
            value: value.to_string(),
        });
    }
    Ok(url)
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingKey(key))
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        source: serde_yml::Error,
    },
    MissingKey(&'static str),
    InvalidUrl {
        key: &'static str,
        value: String,
        source: url::ParseError,
    },
    UnsupportedScheme {
        key: &'static str,
        value: String,
    },
    UnsupportedDataFormat(String),
    InvalidValue {
        key: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, .. } => {
                write!(f, "unable to read config file {}", path.display())
            }
            ConfigError::Parse {
                path: Some(path),
                source,
            } => write!(f, "invalid config file {}: {}", path.display(), source),
            ConfigError::Parse { path: None, source } => write!(f, "invalid config: {}", source),
            ConfigError::MissingKey(key) => write!(f, "required config key '{}' is missing", key),
            ConfigError::InvalidUrl { key, value, .. } => {
                write!(f, "{} '{}' is not a valid URL", key, value)
            }
            ConfigError::UnsupportedScheme { key, value } => {
                write!(f, "{} '{}' must use http or https", key, value)
            }
            ConfigError::UnsupportedDataFormat(format) => {
                write!(f, "data_format '{}' is not supported, expected csv", format)
            }
            ConfigError::InvalidValue { key, reason } => write!(f, "{} {}", key, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidUrl { source, .. } => Some(source),
            ConfigError::MissingKey(_)
            | ConfigError::UnsupportedScheme { .. }
            | ConfigError::UnsupportedDataFormat(_)
            | ConfigError::InvalidValue { .. } => None,
        }
    }
}
