//! Command line options of the sample server.

use clap::{error::ErrorKind, CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::RatekeeperConfig;
use crate::error::{RatekeeperError, Result};

/// Sample HTTP server limiting `GET /sample` per API key.
#[derive(Parser, Debug)]
#[command(name = "ratekeeper-sample", version, about, long_about = None)]
pub struct Args {
    /// Port to listen on [default: 80]
    #[arg(short, long, value_name = "NUMBER", allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// Requests admitted per window and API key [default: 100]
    #[arg(short, long, value_name = "NUMBER", allow_negative_numbers = true)]
    pub requests: Option<i64>,

    /// Window length in milliseconds [default: 3600000]
    #[arg(short, long, value_name = "NUMBER", allow_negative_numbers = true)]
    pub time: Option<i64>,

    /// Path to a configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Validated command line options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationOptions {
    pub port: Option<u16>,
    pub requests: Option<u64>,
    pub window: Option<Duration>,
    pub config: Option<PathBuf>,
}

impl ApplicationOptions {
    /// Parse options from the process arguments.
    ///
    /// `--help` and `--version` print their output and exit the process.
    pub fn from_env() -> Result<Self> {
        match Args::try_parse() {
            Ok(args) => args.validate(),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(e) => Err(invalid(e.to_string())),
        }
    }

    /// Parse options from `args`, the first item being the program name.
    pub fn parse_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Args::try_parse_from(args)
            .map_err(|e| invalid(e.to_string()))?
            .validate()
    }

    /// Override `config` with the options given on the command line.
    pub fn apply(&self, config: &mut RatekeeperConfig) {
        if let Some(port) = self.port {
            config.server.port = Some(port);
        }
        if let Some(requests) = self.requests {
            config.rate_limiting.requests = requests;
        }
        if let Some(window) = self.window {
            config.rate_limiting.window_ms = window.as_millis() as u64;
        }
    }
}

impl Args {
    fn validate(self) -> Result<ApplicationOptions> {
        let port = self
            .port
            .map(|port| {
                u16::try_from(port).map_err(|_| {
                    invalid(format!("port should be between 0 and 65535, got {}", port))
                })
            })
            .transpose()?;

        let requests = self
            .requests
            .map(|requests| {
                u64::try_from(requests).map_err(|_| {
                    invalid(format!(
                        "number of requests should not be negative, got {}",
                        requests
                    ))
                })
            })
            .transpose()?;

        let window = match self.time {
            Some(ms) if ms <= 0 => {
                return Err(invalid(format!("time should be positive, got {}", ms)));
            }
            Some(ms) => Some(Duration::from_millis(ms as u64)),
            None => None,
        };

        Ok(ApplicationOptions {
            port,
            requests,
            window,
            config: self.config,
        })
    }
}

fn invalid(message: String) -> RatekeeperError {
    RatekeeperError::InvalidCommandLine(message)
}

/// Render the usage text.
pub fn help() -> String {
    Args::command().render_help().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Rate;

    fn parse(args: &[&str]) -> Result<ApplicationOptions> {
        let argv = std::iter::once("ratekeeper-sample").chain(args.iter().copied());
        ApplicationOptions::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let options = parse(&[]).unwrap();
        assert_eq!(options, ApplicationOptions::default());

        let mut config = RatekeeperConfig::default();
        options.apply(&mut config);
        assert_eq!(config.server.port, None);
        assert_eq!(
            config.rate_limiting.rate().unwrap(),
            Rate::new(100, Duration::from_millis(3_600_000)).unwrap()
        );
    }

    #[test]
    fn test_all_options() {
        let args = ["-p", "8080", "-r", "5", "-t", "1000", "-c", "ratekeeper.yaml"];
        let options = parse(&args).unwrap();
        assert_eq!(options.port, Some(8080));
        assert_eq!(options.requests, Some(5));
        assert_eq!(options.window, Some(Duration::from_secs(1)));
        assert_eq!(options.config, Some(PathBuf::from("ratekeeper.yaml")));

        let mut config = RatekeeperConfig::default();
        options.apply(&mut config);
        assert_eq!(config.server.port, Some(8080));
        assert_eq!(
            config.rate_limiting.rate().unwrap(),
            Rate::new(5, Duration::from_secs(1)).unwrap()
        );
    }

    #[test]
    fn test_long_options() {
        let options = parse(&["--port", "0", "--requests", "0", "--time", "1"]).unwrap();
        assert_eq!(options.port, Some(0));
        assert_eq!(options.requests, Some(0));
        assert_eq!(options.window, Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_port_out_of_range() {
        for port in ["-1", "65536"] {
            assert!(matches!(
                parse(&["-p", port]),
                Err(RatekeeperError::InvalidCommandLine(_))
            ));
        }
    }

    #[test]
    fn test_negative_requests() {
        assert!(matches!(
            parse(&["-r", "-1"]),
            Err(RatekeeperError::InvalidCommandLine(_))
        ));
    }

    #[test]
    fn test_non_positive_time() {
        for time in ["0", "-10"] {
            assert!(matches!(
                parse(&["-t", time]),
                Err(RatekeeperError::InvalidCommandLine(_))
            ));
        }
    }

    #[test]
    fn test_not_a_number() {
        assert!(matches!(
            parse(&["-r", "many"]),
            Err(RatekeeperError::InvalidCommandLine(_))
        ));
        assert!(matches!(
            parse(&["--unknown"]),
            Err(RatekeeperError::InvalidCommandLine(_))
        ));
    }

    #[test]
    fn test_help_mentions_options() {
        let help = help();
        assert!(help.contains("--port"));
        assert!(help.contains("--requests"));
        assert!(help.contains("--time"));
    }
}
