use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use clap::{ArgAction, Parser};
use clipmesh_core::DEFAULT_PORT;

#[derive(Parser, Debug, Clone)]
#[command(name = "clipmesh", version, about = "Share one text clipboard between machines")]
pub struct ClientArgs {
    /// Hub to join (host:port). Without it this instance becomes the hub.
    #[arg(long)]
    pub target: Option<String>,

    /// Address the hub listens on, without the port.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen: IpAddr,

    #[arg(long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Seconds between clipboard checks.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Encrypt every update with a key derived from a password (`--encrypt false` to disable).
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub encrypt: bool,

    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Hub { bind: SocketAddr },
    Join { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub mode: Mode,
    pub interval: Duration,
    pub encrypt: bool,
    pub verbose: bool,
    pub json: bool,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        let mode = match args.target.map(|t| t.trim().to_owned()) {
            Some(target) if !target.is_empty() => Mode::Join { target },
            _ => Mode::Hub {
                bind: SocketAddr::new(args.listen, args.port),
            },
        };

        Self {
            mode,
            interval: Duration::from_secs(args.interval),
            encrypt: args.encrypt,
            verbose: args.verbose,
            json: args.json,
        }
    }
}

pub fn join_hint(host: IpAddr, port: u16) -> String {
    format!(
        "run `clipmesh --target {}` to join this clipboard",
        SocketAddr::new(host, port)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_hint_formats_ipv4_and_ipv6() {
        assert_eq!(
            join_hint(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), 38551),
            "run `clipmesh --target 192.168.1.20:38551` to join this clipboard"
        );
        assert!(join_hint("::1".parse().unwrap(), 4000).contains("[::1]:4000"));
    }
}
