//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`PHYSB_SECTION__KEY`)

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use physbridge_math::Vec3;
use physbridge_physics::{Damping, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Physics configuration
    #[serde(default)]
    pub physics: PhysicsConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
    /// Demo run configuration
    #[serde(default)]
    pub demo: DemoConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`PHYSB_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        // Load user config (optional)
        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // Environment variables override everything
        // PHYSB_PHYSICS__WORKER_THREADS=2 -> physics.worker_threads = 2
        figment = figment.merge(Env::prefixed("PHYSB_").split("__"));

        figment.extract().map_err(ConfigError::from)
    }

    /// Settings for the physics simulation
    pub fn simulation_config(&self) -> SimulationConfig {
        self.physics.to_simulation_config()
    }
}

/// Physics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector [x, y, z]
    pub gravity: [f32; 3],
    /// Fraction of linear velocity lost per second
    pub linear_damping: f32,
    /// Fraction of angular velocity lost per second
    pub angular_damping: f32,
    /// Fixed step length in seconds; unset steps by frame time
    pub fixed_timestep: Option<f32>,
    /// Narrow-phase worker threads (0 = calling thread only)
    pub worker_threads: usize,
    /// Freeze the simulation entirely
    pub disable_simulation: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            linear_damping: 0.03,
            angular_damping: 0.03,
            fixed_timestep: Some(1.0 / 60.0),
            worker_threads: 0,
            disable_simulation: false,
        }
    }
}

impl PhysicsConfig {
    /// Convert to the physics crate's SimulationConfig
    pub fn to_simulation_config(&self) -> SimulationConfig {
        let [x, y, z] = self.gravity;
        SimulationConfig::default()
            .with_gravity(Vec3::new(x, y, z))
            .with_damping(Damping::new(self.linear_damping, self.angular_damping))
            .with_fixed_timestep(self.fixed_timestep)
            .with_worker_threads(self.worker_threads)
            .with_disabled(self.disable_simulation)
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Show physics colliders
    pub show_colliders: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            show_colliders: false,
        }
    }
}

/// Demo run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Scene file to load
    pub scene: String,
    /// Number of ticks to run
    pub ticks: u32,
    /// Ticks per second
    pub tick_rate: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scene: "scenes/demo.ron".to_string(),
            ticks: 300,
            tick_rate: 60.0,
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}
