use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Collector server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml, then APP__SECTION__KEY overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        // The dashboard has no default credentials.
        let admin_username = settings
            .get_string("admin.username")
            .or_else(|_| env::var("ADMIN_USERNAME"))
            .map_err(|_| config::ConfigError::NotFound("admin.username".to_string()))?;

        let admin_password = settings
            .get_string("admin.password")
            .or_else(|_| env::var("ADMIN_PASSWORD"))
            .map_err(|_| config::ConfigError::NotFound("admin.password".to_string()))?;

        Ok(Config {
            bind_addr,
            admin_username,
            admin_password,
        })
    }
}

/// Terminal client settings, from `GRADER__*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct GraderConfig {
    pub collector_url: String,
    pub storage_path: PathBuf,
    pub step_budget: u64,
    pub catalog_path: Option<PathBuf>,
}

impl GraderConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        config::Config::builder()
            .set_default("collector_url", "http://localhost:3000/api/submissions")?
            .set_default("storage_path", ".mini-tests/storage.json")?
            .set_default("step_budget", 5_000_000_i64)?
            .add_source(
                config::Environment::with_prefix("GRADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
