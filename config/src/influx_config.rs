use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

/// Connection settings for the InfluxDB sink.
///
/// The sink is only enabled when `address` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfluxConfig {
    #[serde(default)]
    pub address: Option<Url>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_retention")]
    pub retention: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

fn default_database() -> String {
    "services".to_string()
}

fn default_retention() -> String {
    "default".to_string()
}

impl InfluxConfig {
    pub fn enabled(&self) -> bool {
        self.address.is_some()
    }
}
