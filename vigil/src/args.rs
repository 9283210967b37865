use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Vigil demo server
#[derive(Debug, Parser)]
#[command(name = "vigil", about = "Observed HTTP server demonstrating semantic errors and panic recovery")]
pub struct Args {
    /// Path to configuration file; built-in defaults are used when omitted
    #[arg(short, long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long, env = "VIGIL_LISTEN")]
    pub listen: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let args = Args::try_parse_from(["vigil"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.listen.is_none());
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from(["vigil", "--config", "vigil.toml", "--listen", "127.0.0.1:8080"]).unwrap();
        assert_eq!(args.config.as_deref(), Some(std::path::Path::new("vigil.toml")));
        assert_eq!(args.listen, Some(SocketAddr::from(([127, 0, 0, 1], 8080))));
    }

    #[test]
    fn rejects_bad_listen_address() {
        assert!(Args::try_parse_from(["vigil", "--listen", "not-an-address"]).is_err());
    }
}
