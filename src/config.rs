use std::net::SocketAddr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub cors_origins: Vec<String>,
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:3003";

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();

        let database_url = dotenv::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bind_addr = dotenv::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_owned())
            .parse()
            .context("BIND_ADDR is not a socket address")?;

        let max_connections = match dotenv::var("DATABASE_MAX_CONNECTIONS") {
            Ok(v) => v.parse().context("DATABASE_MAX_CONNECTIONS is not a number")?,
            Err(_) => 16,
        };

        let cors_origins = parse_origins(
            &dotenv::var("CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_owned()),
        );

        Ok(Config {
            database_url,
            bind_addr,
            max_connections,
            cors_origins,
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_origins;

    #[test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            parse_origins(" http://a.test, ,http://b.test,"),
            vec!["http://a.test".to_owned(), "http://b.test".to_owned()]
        );
    }
}
