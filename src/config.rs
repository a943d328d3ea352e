use anyhow::Result;
use dotenvy::dotenv;
use std::env;

pub struct Config {
    pub bind_addr: String,
}

pub fn load() -> Result<Config> {
    // A missing .env is fine in deployment; real env vars win either way.
    let _ = dotenv();
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    Ok(Config { bind_addr })
}
