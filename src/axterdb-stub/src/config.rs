use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StubConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keys")]
    pub keys: Vec<KeySeed>,
}

/// A key registered when the stub starts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeySeed {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub databases: Vec<String>,
}

fn default_port() -> u16 {
    8000
}

fn default_keys() -> Vec<KeySeed> {
    vec![KeySeed {
        key: "admin".to_string(),
        name: "admin".to_string(),
        admin: true,
        databases: vec!["main".to_string()],
    }]
}

impl StubConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: StubConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            keys: default_keys(),
        }
    }
}
