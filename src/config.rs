use std::env;
use std::str::FromStr;
use std::time::Duration;
use log::warn;

use crate::error::{StreamError, StreamResult};

// Server Configuration
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_API_BIND_ADDRESS: &str = "127.0.0.1:3000";
pub const STATS_INTERVAL_SECS: u64 = 60;

// Data Configuration
pub const DEFAULT_DATA_FILE: &str = "./data/stocks.json";

// Broadcast Configuration
pub const EVENT_CHANNEL_SIZE: usize = 100;
pub const DELIVERY_TIMEOUT_MS: u64 = 2000;

pub struct Config {
    pub bind_address: String,
    pub api_bind_address: String,
    pub data_file: String,
    pub log_level: String,
    pub event_channel_size: usize,
    pub delivery_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_API_BIND_ADDRESS.to_string()),
            data_file: env::var("DATA_FILE")
                .unwrap_or_else(|_| DEFAULT_DATA_FILE.to_string()),
            log_level: log_level_from_env(),
            event_channel_size: parse_var("EVENT_CHANNEL_SIZE", EVENT_CHANNEL_SIZE),
            delivery_timeout_ms: parse_var("DELIVERY_TIMEOUT_MS", DELIVERY_TIMEOUT_MS),
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.event_channel_size == 0 {
            return Err(StreamError::Config("EVENT_CHANNEL_SIZE must be greater than zero".to_string()));
        }

        if self.delivery_timeout_ms == 0 {
            return Err(StreamError::Config("DELIVERY_TIMEOUT_MS must be greater than zero".to_string()));
        }

        if !std::path::Path::new(&self.data_file).exists() {
            return Err(StreamError::Config(format!("Data file not found: {}", self.data_file)));
        }

        Ok(())
    }

    pub fn log_config(&self) {
        println!("Server Configuration:");
        println!("  Stream Bind Address: {}", self.bind_address);
        println!("  API Bind Address: {}", self.api_bind_address);
        println!("  Data File: {}", self.data_file);
        println!("  Log Level: {}", self.log_level);
        println!("  Event Channel Size: {}", self.event_channel_size);
        println!("  Delivery Timeout: {}ms", self.delivery_timeout_ms);
    }
}

/// Filter for `env_logger`; read before `Config::from_env` so its warnings are logged.
pub fn log_level_from_env() -> String {
    env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
