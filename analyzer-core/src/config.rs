//! Engine configuration, loaded by the consumer (disk/env loading is out of
//! scope for this workspace) and handed to [`crate::engine::Engine::with_config`].
//! Mirrors the teacher's per-section `Default` pattern: every section is
//! independently constructible and `#[serde(default)]` so a caller's TOML
//! only needs to specify what it's overriding.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub renderers: RenderersSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: EngineSection::default(),
            renderers: RenderersSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Per-invocation deadline for a single `CanAnalyze`/`Analyze` call.
    #[serde(with = "duration_secs", rename = "analyzer_timeout_secs")]
    pub analyzer_timeout: Duration,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            analyzer_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderersSection {
    /// Renderer ID used by callers that don't name one explicitly.
    pub default_renderer: String,
}

impl Default for RenderersSection {
    fn default() -> Self {
        Self {
            default_renderer: "markdown".to_string(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.engine.analyzer_timeout, Duration::from_secs(120));
        assert_eq!(config.renderers.default_renderer, "markdown");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = EngineConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.engine.analyzer_timeout, config.engine.analyzer_timeout);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: EngineConfig = toml::from_str("[renderers]\ndefault_renderer = \"json\"\n").unwrap();
        assert_eq!(parsed.renderers.default_renderer, "json");
        assert_eq!(parsed.engine.analyzer_timeout, Duration::from_secs(120));
    }
}
