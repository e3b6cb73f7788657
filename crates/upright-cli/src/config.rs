use std::path::PathBuf;
use std::str::FromStr;
use upright_core::compose::DEFAULT_BLUR_SIGMA;
use upright_core::DetectorConfig;

/// Run configuration, loaded from environment variables and refined by CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the InsightFace `buffalo_l` ONNX files.
    pub model_dir: PathBuf,
    /// Explicit SCRFD model file; overrides `model_dir` when set.
    pub model_path: Option<PathBuf>,
    pub detector: DetectorConfig,
    /// Gaussian sigma for the blurred background of composited output.
    pub blur_sigma: f32,
}

impl Config {
    /// Load configuration from `UPRIGHT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = DetectorConfig::default();

        Self {
            model_dir: lookup("UPRIGHT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(upright_core::default_model_dir),
            model_path: lookup("UPRIGHT_MODEL_PATH").map(PathBuf::from),
            detector: DetectorConfig {
                input_size: parse_or(&lookup, "UPRIGHT_DET_SIZE", defaults.input_size),
                confidence_threshold: parse_or(
                    &lookup,
                    "UPRIGHT_CONFIDENCE_THRESHOLD",
                    defaults.confidence_threshold,
                ),
                nms_threshold: parse_or(&lookup, "UPRIGHT_NMS_THRESHOLD", defaults.nms_threshold),
                intra_threads: parse_or(&lookup, "UPRIGHT_INTRA_THREADS", defaults.intra_threads),
            },
            blur_sigma: parse_or(&lookup, "UPRIGHT_BLUR_RADIUS", DEFAULT_BLUR_SIGMA),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.model_dir.join(upright_core::SCRFD_MODEL_FILE))
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("UPRIGHT_MODEL_DIR", "/models")]);
        assert_eq!(config.detector, DetectorConfig::default());
        assert_eq!(config.blur_sigma, 10.0);
        assert_eq!(config.scrfd_model_path(), PathBuf::from("/models/det_10g.onnx"));
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("UPRIGHT_DET_SIZE", "320"),
            ("UPRIGHT_CONFIDENCE_THRESHOLD", "0.7"),
            ("UPRIGHT_BLUR_RADIUS", " 4.5 "),
            ("UPRIGHT_INTRA_THREADS", "4"),
        ]);
        assert_eq!(config.detector.input_size, 320);
        assert_eq!(config.detector.confidence_threshold, 0.7);
        assert_eq!(config.detector.intra_threads, 4);
        assert_eq!(config.blur_sigma, 4.5);
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        let config = config_from(&[("UPRIGHT_DET_SIZE", "large")]);
        assert_eq!(config.detector.input_size, 640);
    }

    #[test]
    fn test_explicit_model_path_wins() {
        let config = config_from(&[
            ("UPRIGHT_MODEL_DIR", "/models"),
            ("UPRIGHT_MODEL_PATH", "/elsewhere/scrfd_2.5g_kps.onnx"),
        ]);
        assert_eq!(
            config.scrfd_model_path(),
            PathBuf::from("/elsewhere/scrfd_2.5g_kps.onnx")
        );
    }
}
