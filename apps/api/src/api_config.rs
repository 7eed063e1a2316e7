use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use ipnet::IpNet;
use taskgate_core::AppError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    /// `None` selects the in-memory adapters.
    pub database_url: Option<String>,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub audit_queue_capacity: usize,
    pub trusted_proxies: Vec<IpNet>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if migrate_only && database_url.is_none() {
            return Err(AppError::Validation(
                "DATABASE_URL is required to run migrations".to_owned(),
            ));
        }

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let audit_queue_capacity = match env::var("AUDIT_QUEUE_CAPACITY") {
            Ok(value) => value.trim().parse::<usize>().map_err(|error| {
                AppError::Validation(format!("invalid AUDIT_QUEUE_CAPACITY: {error}"))
            })?,
            Err(_) => 1024,
        };
        if audit_queue_capacity == 0 {
            return Err(AppError::Validation(
                "AUDIT_QUEUE_CAPACITY must be greater than zero".to_owned(),
            ));
        }

        let trusted_proxies =
            parse_trusted_proxies(env::var("TRUSTED_PROXY_CIDRS").unwrap_or_default().as_str())?;

        Ok(Self {
            migrate_only,
            database_url,
            frontend_url,
            api_host,
            api_port,
            audit_queue_capacity,
            trusted_proxies,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

/// Parses a comma separated CIDR list. Bare addresses are accepted as host routes.
pub fn parse_trusted_proxies(value: &str) -> Result<Vec<IpNet>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            IpNet::from_str(entry)
                .or_else(|_| IpAddr::from_str(entry).map(IpNet::from))
                .map_err(|error| {
                    AppError::Validation(format!(
                        "invalid TRUSTED_PROXY_CIDRS entry '{entry}': {error}"
                    ))
                })
        })
        .collect()
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::parse_trusted_proxies;

    #[test]
    fn trusted_proxies_accept_cidrs_and_bare_addresses() {
        let parsed = parse_trusted_proxies("10.0.0.0/8, 192.168.1.7 ,::1").unwrap_or_default();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].to_string(), "192.168.1.7/32");
    }

    #[test]
    fn malformed_proxy_entries_are_rejected() {
        assert!(parse_trusted_proxies("10.0.0.0/33").is_err());
        assert!(parse_trusted_proxies("").unwrap_or_default().is_empty());
    }
}
