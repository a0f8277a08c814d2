use corpora_core::config::SheddingConfig;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::System;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    Normal,
    Elevated,
    High,
    Critical,
}

/// Quality knobs applied under load. The shedder degrades; it never rejects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegradationProfile {
    pub top_k: usize,
    pub apply_mmr: bool,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
}

impl DegradationProfile {
    /// Full-quality profile, also used when shedding is disabled.
    pub fn normal(top_k: usize, max_output_tokens: u32) -> Self {
        Self {
            top_k,
            apply_mmr: true,
            max_output_tokens,
            temperature: 0.7,
            retrieval_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub level: LoadLevel,
    pub degraded: bool,
    pub profile: DegradationProfile,
}

/// Source of CPU and memory percentages, behind a trait so tests inject
/// fixed values.
pub trait SystemMonitor: Send + Sync {
    /// `(cpu_percent, memory_percent)`, or `None` when sampling failed.
    fn sample(&self) -> Option<(f32, f32)>;
}

pub struct SysinfoMonitor {
    system: Mutex<System>,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor for SysinfoMonitor {
    fn sample(&self) -> Option<(f32, f32)> {
        let mut system = self.system.lock().ok()?;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu = system.global_cpu_usage();
        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        let memory = system.used_memory() as f32 / total as f32 * 100.0;
        Some((cpu, memory))
    }
}

/// Fixed readings for tests and drills.
pub struct FixedMonitor {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl SystemMonitor for FixedMonitor {
    fn sample(&self) -> Option<(f32, f32)> {
        Some((self.cpu_percent, self.memory_percent))
    }
}

pub struct LoadShedder {
    monitor: Box<dyn SystemMonitor>,
    thresholds: SheddingConfig,
    last_level: Mutex<LoadLevel>,
}

impl LoadShedder {
    pub fn new(monitor: Box<dyn SystemMonitor>, thresholds: SheddingConfig) -> Self {
        Self {
            monitor,
            thresholds,
            last_level: Mutex::new(LoadLevel::Normal),
        }
    }

    /// Samples the system and maps the worse of CPU and memory pressure to a
    /// degradation profile for this request. Sampling failure reads as
    /// NORMAL.
    pub fn check(&self, requested_top_k: usize, configured_max_tokens: u32) -> LoadSample {
        let (cpu, memory) = match self.monitor.sample() {
            Some(sample) => sample,
            None => {
                warn!("load sampling failed, assuming normal load");
                (0.0, 0.0)
            }
        };

        let level = self.level_for(cpu, memory);
        self.log_level_changes(level, cpu, memory);

        let profile = self.profile_for(level, requested_top_k, configured_max_tokens);
        LoadSample {
            cpu_percent: cpu,
            memory_percent: memory,
            level,
            degraded: level != LoadLevel::Normal,
            profile,
        }
    }

    fn level_for(&self, cpu: f32, memory: f32) -> LoadLevel {
        let t = &self.thresholds;
        let cpu_level = if cpu >= t.cpu_critical {
            LoadLevel::Critical
        } else if cpu >= t.cpu_high {
            LoadLevel::High
        } else if cpu >= t.cpu_elevated {
            LoadLevel::Elevated
        } else {
            LoadLevel::Normal
        };
        let memory_level = if memory >= t.memory_critical {
            LoadLevel::Critical
        } else if memory >= t.memory_high {
            LoadLevel::High
        } else if memory >= t.memory_elevated {
            LoadLevel::Elevated
        } else {
            LoadLevel::Normal
        };
        cpu_level.max(memory_level)
    }

    fn profile_for(
        &self,
        level: LoadLevel,
        requested_top_k: usize,
        configured_max_tokens: u32,
    ) -> DegradationProfile {
        match level {
            LoadLevel::Critical => DegradationProfile {
                top_k: 2,
                apply_mmr: false,
                max_output_tokens: 512,
                temperature: 0.3,
                retrieval_timeout: Duration::from_secs(5),
                generation_timeout: Duration::from_secs(10),
            },
            LoadLevel::High => DegradationProfile {
                top_k: (requested_top_k / 2).max(3),
                apply_mmr: false,
                max_output_tokens: 1_024,
                temperature: 0.5,
                retrieval_timeout: Duration::from_secs(10),
                generation_timeout: Duration::from_secs(20),
            },
            LoadLevel::Elevated => DegradationProfile {
                top_k: ((requested_top_k as f32 * 0.75) as usize).max(4),
                apply_mmr: true,
                max_output_tokens: (configured_max_tokens as f32 * 0.75) as u32,
                temperature: 0.7,
                retrieval_timeout: Duration::from_secs(15),
                generation_timeout: Duration::from_secs(30),
            },
            LoadLevel::Normal => DegradationProfile::normal(requested_top_k, configured_max_tokens),
        }
    }

    fn log_level_changes(&self, level: LoadLevel, cpu: f32, memory: f32) {
        let Ok(mut last) = self.last_level.lock() else {
            return;
        };
        if *last != level {
            if level == LoadLevel::Normal {
                info!(cpu, memory, "system returned to normal load");
            } else {
                warn!(?level, cpu, memory, "load level changed, degrading quality");
            }
            *last = level;
        }
    }
}
