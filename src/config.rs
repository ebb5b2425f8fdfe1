use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub gateway_base_url: String,
    pub gateway_secret: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let gateway_base_url = env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.paygate.example".to_string());
        let gateway_secret = env::var("GATEWAY_SECRET")?;
        Ok(Self {
            database_url,
            host,
            port,
            gateway_base_url,
            gateway_secret,
        })
    }
}
