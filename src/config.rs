use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Hospital records API server.
///
/// Every option can also be supplied through the environment variable named
/// next to it.
#[derive(Debug, Clone, Parser)]
#[command(name = "hospital-records", version, about)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database path, `sqlite://` URL or `:memory:`
    #[arg(long, env = "DATABASE_URL", default_value = "hospital.db")]
    pub database_url: String,

    /// Secret used to sign session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Password for the bootstrap `admin` account; no account is seeded without it
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// bcrypt work factor for new password hashes
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST,
          value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Upper bound on the time spent serving one request, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 15)]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["hospital-records", "--jwt-secret", "s3cret"]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, "hospital.db");
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert!(config.admin_password.is_none());
        assert_eq!(config.listen_addr().port(), 8080);
    }

    #[test]
    fn test_explicit_values() {
        let config = Config::try_parse_from([
            "hospital-records",
            "--port",
            "9000",
            "--database-url",
            "sqlite://data/records.db",
            "--jwt-secret",
            "s3cret",
            "--admin-password",
            "bootstrap",
            "--bcrypt-cost",
            "10",
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url, "sqlite://data/records.db");
        assert_eq!(config.admin_password.as_deref(), Some("bootstrap"));
        assert_eq!(config.bcrypt_cost, 10);
    }

    #[test]
    fn test_bcrypt_cost_out_of_range_rejected() {
        let result = Config::try_parse_from([
            "hospital-records",
            "--jwt-secret",
            "s3cret",
            "--bcrypt-cost",
            "2",
        ]);
        assert!(result.is_err());
    }
}
