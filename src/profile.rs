use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chaos::{lyapunov_exponent, ChaosGenerator, CHAOS_MAX, CHAOS_ONSET};
use crate::error::{Error, Result};

fn default_anomaly_level() -> i64 {
    5
}

fn default_threads() -> usize {
    1
}

/// Mutation profile loaded from a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionProfile {
    pub chaos_seed: f64,
    pub chaos_param: f64,
    pub inject_count: u64,
    #[serde(default = "default_anomaly_level")]
    pub anomaly_level: i64,
    /// Draw order follows list order, so this stays a `Vec`.
    pub mutate_columns: Vec<String>,
    #[serde(default)]
    pub anomaly_boost: HashMap<String, f64>,
    pub label: String,
    #[serde(default)]
    pub performance: PerformanceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSettings {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub simulate_delay: bool,
    #[serde(default)]
    pub delay_ms: u64,
    /// Advisory label only.
    #[serde(default)]
    pub use_gpu: bool,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            simulate_delay: false,
            delay_ms: 0,
            use_gpu: false,
        }
    }
}

impl PerformanceSettings {
    pub fn row_delay_ms(&self) -> Option<u64> {
        (self.simulate_delay && self.delay_ms > 0).then_some(self.delay_ms)
    }
}

impl InjectionProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.to_string_lossy();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("failed to read profile '{display}'"), e))?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Json { source, .. } => Error::Json {
                ctx: format!("invalid profile '{display}'"),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mut profile: InjectionProfile = serde_json::from_str(text).map_err(|e| {
            if e.is_data() {
                Error::Config(e.to_string())
            } else {
                Error::Json {
                    ctx: "invalid profile".to_string(),
                    source: e,
                }
            }
        })?;
        profile.validate()?;
        if profile.performance.threads == 0 {
            log::warn!("performance.threads = 0, using 1 thread");
            profile.performance.threads = 1;
        }
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.chaos_seed > 0.0 && self.chaos_seed < 1.0) {
            return Err(Error::Config(format!(
                "chaos_seed must lie strictly between 0 and 1, got {}",
                self.chaos_seed
            )));
        }
        if !(CHAOS_ONSET..=CHAOS_MAX).contains(&self.chaos_param) {
            return Err(Error::Config(format!(
                "chaos_param must lie in [{CHAOS_ONSET}, {CHAOS_MAX}] to stay chaotic, got {}",
                self.chaos_param
            )));
        }
        let lyapunov = lyapunov_exponent(self.chaos_seed, self.chaos_param);
        if lyapunov <= 0.0 {
            return Err(Error::Config(format!(
                "chaos_param {} falls in a periodic window (Lyapunov exponent {lyapunov:.4}); draws would repeat",
                self.chaos_param
            )));
        }
        if let Some((col, _)) = self.anomaly_boost.iter().find(|(_, f)| !f.is_finite()) {
            return Err(Error::Config(format!(
                "anomaly_boost for '{col}' is not a finite number"
            )));
        }
        Ok(())
    }

    /// `1 + anomaly_level / 10`.
    pub fn scale_factor(&self) -> f64 {
        1.0 + self.anomaly_level as f64 / 10.0
    }

    pub fn generator(&self) -> ChaosGenerator {
        ChaosGenerator::new(self.chaos_seed, self.chaos_param)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Json {
            ctx: "failed to serialize profile".to_string(),
            source: e,
        })
    }
}
