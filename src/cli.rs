//! Command-line flags: `-s` picks the session bus instead of the system
//! bus, `-p`/`--port` the HTTP port (rejecting the ephemeral-port range
//! above 32768 via `clap`'s `value_parser`), `--prefix` the URL mount
//! point so the bridge can sit alongside other HTTP services, and
//! `-v`/`--log-level` the log verbosity.

use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    let port: u32 = s.parse().map_err(|_| "port must be a number".to_string())?;
    if port > 32768 {
        return Err("port must be 0..32768 (upper ports are reserved for random port numbers assigned by Linux)".to_string());
    }
    Ok(port as u16)
}

/// Exposes a local D-Bus object graph through an HTTP/JSON interface.
#[derive(Debug, Parser)]
#[command(name = "dbus-http-bridge", version)]
pub struct Args {
    /// Run on the session bus instead of the system bus.
    #[arg(short, long)]
    pub session: bool,

    /// HTTP port to listen on.
    #[arg(short, long, default_value = "8080", value_parser = parse_port)]
    pub port: u16,

    /// URL prefix the bridge is served under.
    #[arg(long, default_value = "/dbus")]
    pub prefix: String,

    /// Log verbosity.
    #[arg(short = 'v', long = "log-level", default_value = "info")]
    pub log_level: LogLevel,
}
