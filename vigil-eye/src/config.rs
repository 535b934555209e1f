//! Configuration for vigil-eye

use crate::error::VisionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vigil_core::{ContainerSize, DetectionMode, DetectionSettings, FrameSize};

/// Which way a camera should face when the device offers a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

/// Resolution and facing requested from the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing_mode: FacingMode::Environment,
        }
    }
}

impl CameraConstraints {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// Vision system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Detection loop tick interval in milliseconds
    pub poll_interval_ms: u64,
    /// Settings a new session starts with
    pub default_settings: DetectionSettings,
    /// Constraints passed to the capture device
    pub camera: CameraConstraints,
    /// Frame size assumed when the source reports none
    pub fallback_frame: FrameSize,
    /// Container size before the host reports a layout
    pub initial_container: ContainerSize,
    /// Mode a new session starts in
    pub initial_mode: DetectionMode,
    /// Model variant identifier, informational
    pub model_base: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            default_settings: DetectionSettings::default(),
            camera: CameraConstraints::default(),
            fallback_frame: FrameSize::new(640, 480),
            initial_container: ContainerSize {
                width: 640.0,
                height: 480.0,
            },
            initial_mode: DetectionMode::Webcam,
            model_base: "mobilenet_v2".to_string(),
        }
    }
}

impl VisionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), VisionError> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 10_000 {
            return Err(VisionError::Config(
                "Poll interval must be between 1 and 10000 ms".to_string(),
            ));
        }

        self.default_settings.validate()?;

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(VisionError::Config("Camera resolution must be non-zero".to_string()));
        }

        if self.camera.width > 7680 || self.camera.height > 4320 {
            return Err(VisionError::Config("Camera resolution too large (max 8K)".to_string()));
        }

        if self.fallback_frame.is_empty() {
            return Err(VisionError::Config("Fallback frame size must be non-zero".to_string()));
        }

        let c = self.initial_container;
        if !c.width.is_finite() || !c.height.is_finite() || c.width < 0.0 || c.height < 0.0 {
            return Err(VisionError::Config(
                "Initial container size must be finite and non-negative".to_string(),
            ));
        }

        if self.model_base.trim().is_empty() {
            return Err(VisionError::Config("Model base must not be empty".to_string()));
        }

        Ok(())
    }

    /// Load configuration from a TOML, YAML or JSON file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();

        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(VisionError::Config("Path traversal detected".to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let config: VisionConfig = match ext.as_str() {
            "toml" => toml::from_str(&content)
                .map_err(|e| VisionError::Config(format!("Invalid TOML config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| VisionError::Config(format!("Invalid YAML config: {}", e)))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| VisionError::Config(format!("Invalid JSON config: {}", e)))?,
            other => {
                return Err(VisionError::Config(format!(
                    "Unsupported config format: {:?}",
                    other
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply `VIGIL_*` environment overrides, then re-validate.
    pub fn apply_env_overrides(&mut self) -> Result<(), VisionError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), VisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIGIL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v.trim().parse().map_err(|_| {
                VisionError::Config(format!("VIGIL_POLL_INTERVAL_MS is not a number: {}", v))
            })?;
        }
        if let Some(v) = lookup("VIGIL_THRESHOLD") {
            self.default_settings.confidence_threshold = v.trim().parse().map_err(|_| {
                VisionError::Config(format!("VIGIL_THRESHOLD is not a number: {}", v))
            })?;
        }
        if let Some(v) = lookup("VIGIL_MAX_DETECTIONS") {
            self.default_settings.max_detections = v.trim().parse().map_err(|_| {
                VisionError::Config(format!("VIGIL_MAX_DETECTIONS is not a number: {}", v))
            })?;
        }
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = VisionConfig::default();
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.camera.facing_mode, FacingMode::Environment);
        assert_eq!(config.fallback_frame, FrameSize::new(640, 480));
        assert_eq!(config.initial_mode, DetectionMode::Webcam);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_poll_interval() {
        let mut config = VisionConfig::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());
        config.poll_interval_ms = 10_001;
        assert!(config.validate().is_err());
        config.poll_interval_ms = 10_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_camera() {
        let mut config = VisionConfig::default();
        config.camera.width = 0;
        assert!(config.validate().is_err());

        config.camera.width = 7681;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_settings() {
        let mut config = VisionConfig::default();
        config.default_settings.max_detections = 0;
        assert!(matches!(config.validate(), Err(VisionError::Core(_))));
    }

    #[test]
    fn test_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "poll_interval_ms = 250").unwrap();
        writeln!(file, "initial_mode = \"image\"").unwrap();
        writeln!(file, "[default_settings]").unwrap();
        writeln!(file, "active = false").unwrap();
        writeln!(file, "confidence_threshold = 0.6").unwrap();
        writeln!(file, "max_detections = 5").unwrap();

        let config = VisionConfig::from_file(&path).unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.initial_mode, DetectionMode::Image);
        assert_eq!(config.default_settings.max_detections, 5);
        assert_eq!(config.camera, CameraConstraints::default());
    }

    #[test]
    fn test_config_from_json_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.json");
        std::fs::write(&path, r#"{"poll_interval_ms": 0}"#).unwrap();
        assert!(VisionConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_config_from_file_rejects_traversal_and_unknown_format() {
        assert!(VisionConfig::from_file("../etc/vigil.toml").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.ini");
        std::fs::write(&path, "poll_interval_ms=1").unwrap();
        assert!(VisionConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VIGIL_POLL_INTERVAL_MS", "50"),
            ("VIGIL_THRESHOLD", "0.75"),
            ("VIGIL_MAX_DETECTIONS", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = VisionConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.default_settings.confidence_threshold, 0.75);
        assert_eq!(config.default_settings.max_detections, 3);
    }

    #[test]
    fn test_env_overrides_reject_garbage() {
        let mut config = VisionConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "VIGIL_MAX_DETECTIONS").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }
}
