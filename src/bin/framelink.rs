use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use framelink::diagnostics::{FrameDumper, WireTapConnection};
use framelink::network::{SerialConnection, TcpConnection, TcpListener, UdpConnection};
use framelink::service::{
    setup_local_tracing, setup_tracing, verbosity_directive, AckHandler, CodecKind,
};
use framelink::{
    AppConfig, AppError, AppResult, Connection, ConnectionManager, Listener, Peer, Server,
};
use tokio::runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// directory for the hourly rolling log file; console only when absent
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    /// wire framing, overrides peer.codec
    #[arg(long, value_enum)]
    pub codec: Option<CodecKind>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the TCP server, answering every frame with "ACK: <payload>"
    Serve,
    /// Send frames to a TCP server and print the replies
    Connect {
        /// server address, defaults to network.ip:network.port
        #[arg(long)]
        addr: Option<SocketAddr>,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Send frames over connected UDP and print the replies
    Udp {
        /// remote address, defaults to network.ip:network.udp_port
        #[arg(long)]
        remote: Option<SocketAddr>,
        #[arg(long, default_value = "0.0.0.0:0")]
        local: SocketAddr,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Open a serial port, send frames and print what comes back
    Serial {
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
        #[command(flatten)]
        client: ClientArgs,
    },
    PrintConfig,
}

#[derive(Args)]
pub struct ClientArgs {
    /// payloads to send, one frame each
    pub messages: Vec<String>,
    /// seconds to wait for each reply; 0 keeps printing frames until ctrl-c
    #[arg(long, default_value_t = 5)]
    pub wait: u64,
    /// also dump raw transport chunks
    #[arg(long)]
    pub raw: bool,
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();

    // config first: it decides whether dump output must pass the filter
    let (mut config, config_source) = load_config(commandline.conf.as_deref())?;
    if let Some(codec) = commandline.codec {
        config.peer.codec = codec;
    }

    let dump_enabled = config.dump.enabled || raw_dump_requested(commandline.command.as_ref());
    let directive = verbosity_directive(commandline.verbose);
    let _log_guard = match &commandline.log_dir {
        Some(log_dir) => Some(setup_tracing(log_dir, directive, dump_enabled)?),
        None => {
            setup_local_tracing(directive, dump_enabled)?;
            None
        }
    };
    info!("configuration loaded from {}", config_source);

    // startup tokio runtime
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;

    match commandline.command.unwrap_or(Command::Serve) {
        Command::Serve => rt.block_on(serve(config)),
        Command::Connect { addr, client } => rt.block_on(async {
            let addr = match addr {
                Some(addr) => addr,
                None => config.network.tcp_address()?,
            };
            let connection = TcpConnection::connect_timeout(addr, Duration::from_secs(5)).await?;
            exchange(Arc::new(connection), &config, client).await
        }),
        Command::Udp {
            remote,
            local,
            client,
        } => rt.block_on(async {
            let remote = match remote {
                Some(remote) => remote,
                None => config.network.udp_address()?,
            };
            let connection = UdpConnection::connect(local, remote).await?;
            exchange(Arc::new(connection), &config, client).await
        }),
        Command::Serial { port, baud, client } => rt.block_on(async {
            let port = port.unwrap_or_else(|| config.serial.port_name.clone());
            let baud = baud.unwrap_or(config.serial.baud_rate);
            let connection = SerialConnection::open(&port, baud)?;
            exchange(Arc::new(connection), &config, client).await
        }),
        Command::PrintConfig => {
            println!("{:#?}", config);
            Ok(())
        }
    }
}

fn raw_dump_requested(command: Option<&Command>) -> bool {
    match command {
        Some(Command::Connect { client, .. })
        | Some(Command::Udp { client, .. })
        | Some(Command::Serial { client, .. }) => client.raw,
        _ => false,
    }
}

/// Returns the config and where it came from.
fn load_config(conf: Option<&str>) -> AppResult<(AppConfig, String)> {
    match conf {
        Some(path) => Ok((AppConfig::set_up_config(path)?, path.to_string())),
        None => {
            let path = PathBuf::from("./conf.toml");
            if path.exists() {
                Ok((AppConfig::set_up_config(&path)?, path.display().to_string()))
            } else {
                Ok((AppConfig::default(), "built-in defaults".to_string()))
            }
        }
    }
}

async fn serve(config: AppConfig) -> AppResult<()> {
    let mut listener = TcpListener::new(config.network.tcp_address()?);
    listener.start().await?;

    let manager = Arc::new(ConnectionManager::new());
    let mut server = Server::new(
        Box::new(listener),
        config.peer.build_codec(),
        manager,
        config.network.max_connection,
    )
    .with_peer_config(config.peer.clone());
    if config.dump.enabled {
        server = server.with_tap(Arc::new(FrameDumper::new(config.dump.clone())));
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received ctrl-c, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    server.run(Arc::new(AckHandler), cancel).await
}

async fn exchange(
    connection: Arc<dyn Connection>,
    config: &AppConfig,
    client: ClientArgs,
) -> AppResult<()> {
    let connection: Arc<dyn Connection> = if client.raw {
        let mut options = config.dump.clone();
        options.enabled = true;
        Arc::new(WireTapConnection::new(connection, options))
    } else {
        connection
    };

    let mut peer = Peer::with_config(connection, config.peer.build_codec(), &config.peer);
    if config.dump.enabled {
        peer = peer.with_tap(Arc::new(FrameDumper::new(config.dump.clone())));
    }
    let peer = Arc::new(peer);

    let cancel = CancellationToken::new();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let reader = {
        let peer = peer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            peer.receive_loop(
                move |frame| {
                    let frame_tx = frame_tx.clone();
                    async move {
                        let _ = frame_tx.send(frame);
                    }
                },
                cancel,
            )
            .await
        })
    };

    for message in &client.messages {
        peer.send(message.as_bytes()).await?;
    }

    let expected = client.messages.len();
    let mut received = 0;
    loop {
        if client.wait > 0 && expected > 0 && received >= expected {
            break;
        }
        let next = if client.wait == 0 {
            tokio::select! {
                frame = frame_rx.recv() => frame,
                _ = tokio::signal::ctrl_c() => break,
            }
        } else {
            match tokio::time::timeout(Duration::from_secs(client.wait), frame_rx.recv()).await {
                Ok(frame) => frame,
                Err(_) => {
                    if received < expected {
                        warn!("{} of {} replies received", received, expected);
                    }
                    break;
                }
            }
        };
        match next {
            Some(frame) => {
                println!("{}", String::from_utf8_lossy(&frame));
                received += 1;
            }
            // receive loop ended
            None => break,
        }
    }

    cancel.cancel();
    reader
        .await
        .map_err(|e| AppError::IllegalStateError(format!("receive task failed: {}", e)))?
}
