//! Overland session server binary.
//!
//! Reads `OVERLAND_CONFIG` (or the defaults), sets the table, and pumps renet
//! traffic to and from the session actor until interrupted.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use renet::{ConnectionConfig, RenetServer, ServerEvent};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use overland_server::{
    build_game, channel_id, create_channel_configs, deserialize_client_message,
    serialize_server_message, ClientMessage, ConfigError, Courier, Outbound, ServerConfig, ServerMessage,
    ServerRunner, SessionActor, SessionError, SessionHandle, SessionSettings, TransportConfig,
    TransportError, PROTOCOL_ID,
};

const DEFAULT_FILTER: &str = "overland_server=info,overland_core=info";
const TICK: Duration = Duration::from_millis(16);
const HOUSEKEEPING: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = ServerConfig::from_env()?;
    config.validate()?;
    let game = build_game(&config)?;
    let (session, mut outbound, actor) = SessionActor::spawn(game, SessionSettings::from(&config));

    let mut renet = RenetServer::new(ConnectionConfig {
        available_bytes_per_tick: 60_000,
        server_channels_config: create_channel_configs(),
        client_channels_config: create_channel_configs(),
    });
    let mut transport = ServerRunner::new(TransportConfig {
        public_address: config.bind_address,
        max_clients: usize::from(config.max_players),
        private_key: None,
    })?;

    info!("Overland server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        address = ?transport.local_addr(),
        protocol = format_args!("{PROTOCOL_ID:016x}"),
        "listening"
    );

    let mut courier = Courier::new();
    let mut ticker = tokio::time::interval(TICK);
    let mut last_housekeeping = Instant::now();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        transport.receive(&mut renet, TICK);
        pump_events(&mut renet, &session).await?;
        pump_messages(&mut renet, &session).await?;
        deliver(&mut renet, &mut courier, &mut outbound);

        if last_housekeeping.elapsed() >= HOUSEKEEPING {
            last_housekeeping = Instant::now();
            session.tick(last_housekeeping).await?;
        }
        transport.send(&mut renet);
    }

    renet.disconnect_all();
    transport.send(&mut renet);
    drop(session);
    if let Err(e) = actor.await {
        error!(error = %e, "session task ended abnormally");
    }
    Ok(())
}

async fn pump_events(renet: &mut RenetServer, session: &SessionHandle) -> Result<(), SessionError> {
    while let Some(event) = renet.get_event() {
        match event {
            ServerEvent::ClientConnected { client_id } => {
                info!(client_id, "client connected");
            }
            ServerEvent::ClientDisconnected { client_id, reason } => {
                info!(client_id, ?reason, "client disconnected");
                session.leave(client_id).await?;
            }
        }
    }
    Ok(())
}

async fn pump_messages(
    renet: &mut RenetServer,
    session: &SessionHandle,
) -> Result<(), SessionError> {
    for client_id in renet.clients_id() {
        for channel in [channel_id::INTENTS, channel_id::HEARTBEAT] {
            while let Some(data) = renet.receive_message(client_id, channel) {
                let message = match deserialize_client_message(&data) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(client_id, error = %e, "undecodable client message");
                        continue;
                    }
                };
                match message {
                    ClientMessage::Join {
                        name,
                        reconnect_token,
                    } => session.join(client_id, name, reconnect_token).await?,
                    ClientMessage::Submit { intent } => session.submit(client_id, intent).await?,
                    ClientMessage::Ping { timestamp } => {
                        let server_timestamp = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .map_or(0, |d| d.as_millis() as u64);
                        send(
                            renet,
                            client_id,
                            &ServerMessage::Pong {
                                client_timestamp: timestamp,
                                server_timestamp,
                            },
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

fn deliver(
    renet: &mut RenetServer,
    courier: &mut Courier,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) {
    while let Ok(next) = outbound.try_recv() {
        for (client_id, message) in courier.route(next, |id| renet.is_connected(id)) {
            send(renet, client_id, &message);
        }
    }
}

fn send(renet: &mut RenetServer, client_id: u64, message: &ServerMessage) {
    let channel = match message {
        ServerMessage::Pong { .. } => channel_id::HEARTBEAT,
        _ => channel_id::UPDATES,
    };
    match serialize_server_message(message) {
        Ok(data) => renet.send_message(client_id, channel, data),
        Err(e) => error!(client_id, error = %e, "failed to encode server message"),
    }
}
