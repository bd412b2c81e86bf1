use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 120;

#[derive(Parser)]
#[command(name = "deskpilot-server", about = "Desktop control server", long_about = None)]
pub struct Args {
    /// Bind address specification
    ///
    /// Examples:
    ///   --bind 192.168.1.100        Bind to IP on the default port
    ///   --bind :8080                Bind to localhost on port 8080
    ///   --bind 192.168.1.100:8080   Bind to IP and port
    ///   --bind lan                  Bind to LAN IP on the default port
    ///   --bind lan:8080             Bind to LAN IP on port 8080
    ///   --bind [::1]:8080           Bind to IPv6 address with port (use brackets)
    ///   (default is all interfaces on port 5000)
    #[arg(long, default_value_t = BindAddress::default())]
    pub bind: BindAddress,

    /// File each screenshot is written to before it is sent
    #[arg(long)]
    pub screenshot_path: Option<PathBuf>,

    /// Seconds a command may run before it is killed
    #[arg(long, default_value_t = DEFAULT_EXEC_TIMEOUT_SECS)]
    pub exec_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    /// Bind to a specific IP
    Ip { ip: IpAddr, port: u16 },
    /// Bind to localhost
    Localhost { port: u16 },
    /// Bind to LAN IP
    Lan { port: u16 },
}

impl Default for BindAddress {
    fn default() -> Self {
        BindAddress::Ip {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl FromStr for BindAddress {
    type Err = anyhow::Error;

    fn from_str(bind: &str) -> Result<Self, Self::Err> {
        if bind == "lan" {
            return Ok(BindAddress::Lan { port: DEFAULT_PORT });
        }

        if let Some(port) = bind.strip_prefix("lan:") {
            return Ok(BindAddress::Lan {
                port: parse_port(port)?,
            });
        }

        if let Some(port) = bind.strip_prefix(':') {
            return Ok(BindAddress::Localhost {
                port: parse_port(port)?,
            });
        }

        // IPv6 with brackets: "[::1]" or "[::1]:port"
        if let Some(rest) = bind.strip_prefix('[') {
            let (ip, rest) = rest
                .split_once(']')
                .ok_or_else(|| anyhow::anyhow!("unclosed bracket in IPv6 address"))?;
            let ip: IpAddr = ip
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid IPv6 address: {ip}"))?;

            let port = match rest {
                "" => DEFAULT_PORT,
                rest => match rest.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => anyhow::bail!("expected ':' after IPv6 address in brackets"),
                },
            };

            return Ok(BindAddress::Ip { ip, port });
        }

        // "IP:port", telling it apart from a bare IPv6 address
        if let Some((ip, port)) = bind.rsplit_once(':')
            && let Ok(ip) = ip.parse::<IpAddr>()
            && let Ok(port) = parse_port(port)
        {
            return Ok(BindAddress::Ip { ip, port });
        }

        let ip: IpAddr = bind
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid bind address: {bind}"))?;
        Ok(BindAddress::Ip {
            ip,
            port: DEFAULT_PORT,
        })
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindAddress::Localhost { port } => write!(f, ":{port}"),
            BindAddress::Lan { port } if *port == DEFAULT_PORT => write!(f, "lan"),
            BindAddress::Lan { port } => write!(f, "lan:{port}"),
            BindAddress::Ip { ip, port } if ip.is_ipv6() => write!(f, "[{ip}]:{port}"),
            BindAddress::Ip { ip, port } => write!(f, "{ip}:{port}"),
        }
    }
}

impl BindAddress {
    pub fn is_lan(&self) -> bool {
        matches!(self, BindAddress::Lan { .. })
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        match self {
            BindAddress::Ip { ip, port } => Ok(SocketAddr::new(*ip, *port)),
            BindAddress::Localhost { port } => {
                Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), *port))
            }
            BindAddress::Lan { port } => {
                let ip = local_ip_address::local_ip().context("failed to detect LAN address")?;
                if ip.is_loopback() {
                    anyhow::bail!("no LAN address available, only {ip}");
                }
                Ok(SocketAddr::new(ip, *port))
            }
        }
    }

    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = self.socket_addr()?;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind to {addr}"))
    }
}

fn parse_port(port: &str) -> anyhow::Result<u16> {
    port.parse()
        .map_err(|_| anyhow::anyhow!("invalid port number: {port}"))
}
