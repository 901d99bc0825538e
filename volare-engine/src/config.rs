use serde::Deserialize;
use std::env;

/// Engine configuration, loaded from layered files plus environment.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub fleet: FleetConfig,
}

/// Shape of the fixed fleet built at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct FleetConfig {
    #[serde(default = "default_flight_count")]
    pub flight_count: u16,
    #[serde(default = "default_seats_per_flight")]
    pub seats_per_flight: u32,
}

fn default_flight_count() -> u16 {
    4
}

fn default_seats_per_flight() -> u32 {
    128
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            flight_count: default_flight_count(),
            seats_per_flight: default_seats_per_flight(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default").required(false))
            // Add in the current environment file, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of VOLARE)
            // E.g. `VOLARE_FLEET__FLIGHT_COUNT=8` sets the fleet size
            .add_source(config::Environment::with_prefix("VOLARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
