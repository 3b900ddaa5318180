//! Command-line arguments for the bucketlog binary.

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::model::ControlCommand;

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "bucketlog")]
#[command(about = "Time-bucketed telemetry ingestion with tag-indexed queries")]
pub struct CliArgs {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "BUCKETLOG_CONFIG_FILE")]
    pub config: Option<String>,

    /// HTTP port for the query surface (overrides the config file)
    #[arg(short, long, env = "BUCKETLOG_PORT")]
    pub port: Option<u16>,

    /// Bucket width in seconds (overrides the config file)
    #[arg(long, env = "BUCKETLOG_BUCKET_WIDTH")]
    pub bucket_width: Option<u64>,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Send a control command to a running server and exit
    Admin {
        /// One of kill, snapshot, flush, test
        #[arg(long, value_parser = parse_control_command)]
        command: ControlCommand,

        /// Byte-stream listener of the running server
        #[arg(long, default_value = "127.0.0.1:5000")]
        addr: String,
    },
}

fn parse_control_command(token: &str) -> Result<ControlCommand, String> {
    ControlCommand::parse(token).ok_or_else(|| {
        let valid: Vec<&str> = ControlCommand::ALL.iter().map(|c| c.token()).collect();
        format!("expected one of {}", valid.join(", "))
    })
}

impl CliArgs {
    /// Applies command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(width) = self.bucket_width {
            config.bucket_width_secs = width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_override_config_from_flags() {
        // given
        let args =
            CliArgs::try_parse_from(["bucketlog", "--port", "8081", "--bucket-width", "60"]).unwrap();
        let mut config = Config::default();

        // when
        args.apply(&mut config);

        // then
        assert_eq!(config.http.port, 8081);
        assert_eq!(config.bucket_width_secs, 60);
    }

    #[test]
    fn should_parse_admin_mode() {
        // given/when
        let args = CliArgs::try_parse_from(["bucketlog", "admin", "--command", "flush"]).unwrap();

        // then
        match args.mode {
            Some(Mode::Admin { command, addr }) => {
                assert_eq!(command, ControlCommand::Flush);
                assert_eq!(addr, "127.0.0.1:5000");
            }
            None => panic!("expected admin mode"),
        }
    }

    #[test]
    fn should_reject_unknown_control_command() {
        // given/when
        let result = CliArgs::try_parse_from(["bucketlog", "admin", "--command", "reboot"]);

        // then
        assert!(result.is_err());
    }
}
