use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the server, the broker, the bundled client and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to. A `workers` value of
/// zero lets the HTTP server pick one worker per core.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

/// Configuration settings for the broker.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Upper bound on notifications a topic holds while no subscriber takes
    /// them. Zero means unbounded; a positive value makes publish fail once
    /// the topic is that far behind.
    pub delivery_backlog: usize,
}

/// Settings used by the `topics`, `publish` and `subscribe` commands.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub server_addr: String,
    pub dead_letter: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub delivery_backlog: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub server_addr: Option<String>,
    pub dead_letter: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            delivery_backlog: 0,
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                workers: 0,
            },
            broker: BrokerSettings::default(),
            client: ClientSettings {
                server_addr: "127.0.0.1:8080".to_string(),
                dead_letter: false,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge_over(self, default: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let client = self.client;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
                workers: server
                    .as_ref()
                    .and_then(|s| s.workers)
                    .unwrap_or(default.server.workers),
            },
            broker: BrokerSettings {
                delivery_backlog: broker
                    .as_ref()
                    .and_then(|b| b.delivery_backlog)
                    .unwrap_or(default.broker.delivery_backlog),
            },
            client: ClientSettings {
                server_addr: client
                    .as_ref()
                    .and_then(|c| c.server_addr.clone())
                    .unwrap_or(default.client.server_addr),
                dead_letter: client
                    .as_ref()
                    .and_then(|c| c.dead_letter)
                    .unwrap_or(default.client.dead_letter),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
