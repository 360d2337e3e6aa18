use serde::Deserialize;

use crate::transport::PROTOCOL_PORT;

/// Top-level configuration for the command-line client.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub log: LogSettings,
}

/// Where the broker lives.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
}

/// Local identity and inbound port.
///
/// When `id` is unset the CLI generates one per run.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub id: Option<String>,
    pub listen_port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from [`Settings::default`].
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub id: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                host: "127.0.0.1".to_string(),
                port: PROTOCOL_PORT,
            },
            client: ClientSettings {
                id: None,
                listen_port: PROTOCOL_PORT,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let broker = self.broker;
        let client = self.client;
        let log = self.log;

        Settings {
            broker: BrokerSettings {
                host: broker
                    .as_ref()
                    .and_then(|b| b.host.clone())
                    .unwrap_or(default.broker.host),
                port: broker
                    .as_ref()
                    .and_then(|b| b.port)
                    .unwrap_or(default.broker.port),
            },
            client: ClientSettings {
                id: client
                    .as_ref()
                    .and_then(|c| c.id.clone())
                    .or(default.client.id),
                listen_port: client
                    .as_ref()
                    .and_then(|c| c.listen_port)
                    .unwrap_or(default.client.listen_port),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
