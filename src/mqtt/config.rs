use std::fmt;
use std::time::Duration;

use rumqttc::{MqttOptions, Transport};
use tracing::debug;

use super::error::MqttError;

pub const DEFAULT_BROKER: &str = "127.0.0.1:1883";
pub const DEFAULT_TOPIC: &str = "#";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;

const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;

/// Connection settings for the single broker session.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub broker: String,
    pub username: String,
    pub password: String,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            username: String::new(),
            password: String::new(),
            topic: DEFAULT_TOPIC.to_string(),
            client_id: default_client_id(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

pub fn default_client_id() -> String {
    format!("uplinksub-{}", std::process::id())
}

impl MqttConfig {
    /// Builds the client options. The broker address is only parsed here, so a
    /// malformed address surfaces as a connect failure.
    pub fn to_options(&self) -> Result<MqttOptions, MqttError> {
        let address = BrokerAddress::parse(&self.broker)?;
        debug!("Broker endpoint {}", address);

        let mut options =
            MqttOptions::new(self.client_id.clone(), address.host.clone(), address.port);
        options
            .set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(5)))
            .set_clean_session(true);

        if !self.username.is_empty() {
            options.set_credentials(self.username.clone(), self.password.clone());
        }

        if address.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        Ok(options)
    }
}

/// A broker endpoint in `[scheme://]host[:port]` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    pub fn parse(input: &str) -> Result<Self, MqttError> {
        let invalid = |reason: &str| MqttError::InvalidBrokerAddress {
            address: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (tls, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "tcp" | "mqtt" => (false, rest),
                "ssl" | "tls" | "mqtts" => (true, rest),
                _ => return Err(invalid("unsupported scheme")),
            },
            None => (false, trimmed),
        };

        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(invalid("missing host"));
        }

        let default_port = if tls { TLS_PORT } else { PLAIN_PORT };

        // Bracketed IPv6 literal, e.g. [::1]:1883
        if let Some(stripped) = rest.strip_prefix('[') {
            let (host, tail) = stripped
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port).ok_or_else(|| invalid("invalid port"))?,
                None if tail.is_empty() => default_port,
                None => return Err(invalid("unexpected characters after host")),
            };
            return Ok(Self {
                host: host.to_string(),
                port,
                tls,
            });
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = parse_port(port).ok_or_else(|| invalid("invalid port"))?;
                (host, port)
            }
            None => (rest, default_port),
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if host.contains(':') || host.contains('/') {
            return Err(invalid("malformed host"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|p| *p != 0)
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let scheme = if self.tls { "mqtts" } else { "tcp" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_broker() {
        let address = BrokerAddress::parse(DEFAULT_BROKER).unwrap();
        assert_eq!(address.host, "127.0.0.1");
        assert_eq!(address.port, 1883);
        assert!(!address.tls);
    }

    #[test]
    fn parses_schemes_and_default_ports() {
        let plain = BrokerAddress::parse("tcp://broker.local").unwrap();
        assert_eq!(
            (plain.host.as_str(), plain.port, plain.tls),
            ("broker.local", 1883, false)
        );

        let tls = BrokerAddress::parse("ssl://eu1.cloud.thethings.network").unwrap();
        assert_eq!(tls.port, 8883);
        assert!(tls.tls);

        let explicit = BrokerAddress::parse("mqtts://example.org:9000").unwrap();
        assert_eq!(explicit.port, 9000);
        assert!(explicit.tls);
    }

    #[test]
    fn parses_ipv6_literal() {
        let address = BrokerAddress::parse("[::1]:1884").unwrap();
        assert_eq!(address.host, "::1");
        assert_eq!(address.port, 1884);
        assert_eq!(address.to_string(), "tcp://[::1]:1884");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for input in [
            "",
            "tcp://",
            "127.0.0.1:notaport",
            "127.0.0.1:0",
            "ws://host:80",
            ":1883",
        ] {
            assert!(
                matches!(
                    BrokerAddress::parse(input),
                    Err(MqttError::InvalidBrokerAddress { .. })
                ),
                "expected {:?} to be rejected",
                input
            );
        }
    }

    #[test]
    fn options_only_carry_credentials_with_username() {
        let config = MqttConfig {
            client_id: "test-client".to_string(),
            ..MqttConfig::default()
        };
        let options = config.to_options().unwrap();
        assert!(options.credentials().is_none());
        assert_eq!(options.client_id(), "test-client");
        assert_eq!(options.broker_address(), ("127.0.0.1".to_string(), 1883));

        let config = MqttConfig {
            username: "app@ttn".to_string(),
            password: "NNSXS.secret".to_string(),
            ..config
        };
        let options = config.to_options().unwrap();
        assert_eq!(
            options.credentials(),
            Some(("app@ttn".to_string(), "NNSXS.secret".to_string()))
        );
    }

    #[test]
    fn invalid_broker_fails_when_building_options() {
        let config = MqttConfig {
            broker: "tcp://host:99999".to_string(),
            ..MqttConfig::default()
        };
        assert!(config.to_options().is_err());
    }
}
