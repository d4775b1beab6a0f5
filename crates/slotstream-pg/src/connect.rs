//! Postgres connection management with TLS support.

use std::time::Duration;

use slotstream_config::{ReplicationConfig, SslMode};
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, NoTls, Socket};
use tokio_postgres_rustls_improved::MakeRustlsConnect;
use tracing::{debug, info, warn};

use crate::error::{PgError, PgResult};
use crate::tls;

const APPLICATION_NAME: &str = "slotstream";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to open a session, taken from the `[source]` and `[tls]` tables.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: SslMode,
    pub root_cert: std::path::PathBuf,
}

impl ConnectParams {
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self {
            host: config.source.host.clone(),
            port: config.source.port,
            database: config.source.database.clone(),
            username: config.source.username.clone(),
            password: config.source.password.clone(),
            ssl_mode: config.effective_ssl_mode(),
            root_cert: config.tls.root_cert.clone(),
        }
    }

    fn pg_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(self.host.as_str())
            .port(self.port)
            .dbname(self.database.as_str())
            .user(self.username.as_str())
            .password(self.password.as_str())
            .application_name(APPLICATION_NAME)
            .connect_timeout(CONNECT_TIMEOUT)
            .ssl_mode(match self.ssl_mode {
                SslMode::Disable => PgSslMode::Disable,
                SslMode::Allow | SslMode::Prefer => PgSslMode::Prefer,
                SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => PgSslMode::Require,
            });
        config
    }
}

/// Owns at most one client and recreates it when the server side goes away.
pub struct ConnectionManager {
    params: ConnectParams,
    client: Option<Client>,
}

impl ConnectionManager {
    pub fn new(params: ConnectParams) -> Self {
        Self {
            params,
            client: None,
        }
    }

    /// Return the open client, connecting first if there is none or it has closed.
    pub async fn get_connection(&mut self) -> PgResult<&Client> {
        if self.client.as_ref().is_some_and(|c| c.is_closed()) {
            warn!(host = %self.params.host, "Connection closed, reconnecting");
            self.client = None;
        }

        let client = match self.client.take() {
            Some(client) => client,
            None => self.connect().await?,
        };

        Ok(self.client.insert(client))
    }

    async fn connect(&self) -> PgResult<Client> {
        let config = self.params.pg_config();
        debug!(
            host = %self.params.host,
            port = self.params.port,
            database = %self.params.database,
            sslmode = %self.params.ssl_mode,
            "Connecting to Postgres"
        );

        let client = if self.params.ssl_mode == SslMode::Disable {
            spawn_connection(&config, NoTls).await?
        } else {
            let tls_config = tls::client_config(self.params.ssl_mode, &self.params.root_cert)?;
            spawn_connection(&config, MakeRustlsConnect::new(tls_config)).await?
        };

        info!(
            host = %self.params.host,
            database = %self.params.database,
            sslmode = %self.params.ssl_mode,
            "Connected to Postgres"
        );

        Ok(client)
    }

    /// Drop the client. Returns whether one was open.
    pub fn close(&mut self) -> bool {
        match self.client.take() {
            Some(client) => {
                let was_open = !client.is_closed();
                drop(client);
                debug!(host = %self.params.host, "Closed Postgres connection");
                was_open
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }
}

/// Connect and spawn the connection task, returning only the client.
async fn spawn_connection<T>(config: &Config, tls: T) -> PgResult<Client>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| PgError::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "Postgres connection error");
        }
    });

    Ok(client)
}
