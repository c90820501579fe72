//! Core game server implementation.
//!
//! `GameServer` owns the world of this shard, the connection manager and the
//! packet router, and runs the accept loops plus the background tasks that
//! feed sockets: the bus subscriber and the statistics tick.

use crate::{
    config::ServerConfig,
    connection::ConnectionManager,
    error::ServerError,
    handlers,
    messaging::{HandlerContext, PacketRouter},
    server::connection::{handle_connection, teardown},
};
use futures::stream::{FuturesUnordered, StreamExt};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};
use world_core::{BusDispatcher, BusTransport, ClientSink, LocalBus, MemoryPersistence, Persistence, SightFilter, World, WorldSeed};

#[cfg(unix)]
use std::os::fd::AsRawFd;

/// How long AI loops get to stop during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The core game server structure.
///
/// # Architecture
///
/// * **World**: registry, combat and AI loops of the shard
/// * **Connection Management**: socket lifecycle and character binding
/// * **Packet Router**: opcode dispatch with a recovery boundary
/// * **Bus Subscriber**: cast-near delivery of world events to local sockets
/// * **Multi-threaded Networking**: configurable accept loop scaling
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    world: Arc<World>,

    /// Manager for client connections and messaging
    connection_manager: Arc<ConnectionManager>,

    context: Arc<HandlerContext>,

    router: Arc<PacketRouter>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,

    /// Address actually bound, published once listening
    listening: watch::Sender<Option<SocketAddr>>,
}

impl GameServer {
    /// Creates a server with an in-process bus and in-memory persistence.
    pub fn new(config: ServerConfig, seed: WorldSeed) -> Self {
        Self::with_services(config, seed, Arc::new(LocalBus::default()), Arc::new(MemoryPersistence::new()))
    }

    /// Creates a server on an existing bus, which lets several shards in one
    /// process see each other's broadcasts.
    pub fn with_services(config: ServerConfig, seed: WorldSeed, bus: Arc<dyn BusTransport>, persistence: Arc<dyn Persistence>) -> Self {
        let world = World::new(config.server_id, config.world.clone(), seed, bus, persistence);
        let connection_manager = Arc::new(ConnectionManager::new());
        let context = Arc::new(HandlerContext::new(world.clone(), connection_manager.clone()));

        let mut router = PacketRouter::new();
        handlers::register_all(&mut router);

        let (shutdown_sender, _) = broadcast::channel(1);
        let (listening, _) = watch::channel(None);

        Self {
            config,
            world,
            connection_manager,
            context,
            router: Arc::new(router),
            shutdown_sender,
            listening,
        }
    }

    /// Starts the game server and runs until shutdown.
    ///
    /// # Startup Sequence
    ///
    /// 1. Populate the world and start the AI loops
    /// 2. Start the bus subscriber and the optional tick
    /// 3. Create TCP listeners (one per core with `use_reuse_port`)
    /// 4. Accept until shutdown, then tear every connection down
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        info!("🚀 Starting game server on {}", self.config.bind_address);
        info!("🌍 Shard {} of {}", self.config.server_id, self.config.shard_count);

        let ai_count = self.world.boot().await?;
        info!("🧟 {} AIs populated", ai_count);

        let dispatcher = Arc::new(BusDispatcher::new(self.connection_manager.clone(), Arc::new(SightFilter)));
        let dispatcher_task = dispatcher.spawn(self.world.bus().subscribe(), self.shutdown_sender.subscribe());

        if self.config.tick_interval_ms > 0 {
            self.start_server_tick();
            info!("🕒 Server tick started with interval: {}ms", self.config.tick_interval_ms);
        } else {
            info!("⏸️ Server tick disabled (interval: 0ms)");
        }

        let core_count = num_cpus::get();
        let num_acceptors = if self.config.use_reuse_port { core_count } else { 1 };
        info!("🧠 Detected {} CPU cores, using {} acceptor(s)", core_count, num_acceptors);

        let mut listeners = Vec::new();
        let mut bind_address = self.config.bind_address;
        for i in 0..num_acceptors {
            let listener = self.bind(bind_address)?;
            // an ephemeral port is fixed by the first listener
            bind_address = listener.local_addr()?;
            listeners.push(listener);
            info!("✅ Listener {} bound on {}", i, bind_address);
        }
        self.listening.send_replace(Some(bind_address));

        let idle_timeout = (self.config.connection_timeout > 0).then(|| Duration::from_secs(self.config.connection_timeout));

        let mut accept_futures = listeners
            .into_iter()
            .map(|listener| {
                let context = self.context.clone();
                let router = self.router.clone();
                let shutdown_sender = self.shutdown_sender.clone();
                let max_connections = self.config.max_connections;

                async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, addr)) => {
                                if context.connections.connection_count() >= max_connections {
                                    warn!("Connection limit {} reached, refusing {}", max_connections, addr);
                                    continue;
                                }
                                let context = context.clone();
                                let router = router.clone();
                                let shutdown = shutdown_sender.subscribe();

                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, addr, context, router, idle_timeout, shutdown).await {
                                        debug!("Connection {} ended with error: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                                break;
                            }
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();

        tokio::select! {
            _ = accept_futures.next() => {}
            _ = shutdown_receiver.recv() => {
                info!("Shutdown signal received");
            }
        }

        info!("🧹 Performing server cleanup...");
        for session in self.connection_manager.sessions().await {
            teardown(&self.context, session.connection_id).await;
        }
        self.world.shutdown(SHUTDOWN_GRACE).await;
        dispatcher_task.abort();
        info!("✅ Server cleanup completed");

        info!("Server stopped");
        Ok(())
    }

    fn bind(&self, address: SocketAddr) -> Result<TcpListener, ServerError> {
        let domain = if address.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        if self.config.use_reuse_port {
            #[cfg(unix)]
            {
                let sockfd = socket.as_raw_fd();
                let optval: libc::c_int = 1;
                let ret = unsafe {
                    libc::setsockopt(
                        sockfd,
                        libc::SOL_SOCKET,
                        libc::SO_REUSEPORT,
                        &optval as *const _ as *const libc::c_void,
                        std::mem::size_of_val(&optval) as libc::socklen_t,
                    )
                };
                if ret != 0 {
                    warn!("Failed to set SO_REUSEPORT: {}", std::io::Error::last_os_error());
                }
            }
            #[cfg(not(unix))]
            {
                warn!("SO_REUSEPORT is not supported on this platform. Using SO_REUSEADDR only.");
            }
        }

        socket
            .bind(&address.into())
            .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(65535)
            .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener.set_nonblocking(true).ok();
        TcpListener::from_std(std_listener).map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))
    }

    /// Logs registry and connection statistics at the configured interval
    /// until shutdown.
    fn start_server_tick(&self) {
        let world = self.world.clone();
        let connections = self.connection_manager.clone();
        let mut shutdown = self.shutdown_sender.subscribe();
        let tick_interval = Duration::from_millis(self.config.tick_interval_ms);

        tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            let mut tick_count: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tick_count += 1;
                        let stats = world.stats();
                        debug!(
                            tick = tick_count,
                            maps = stats.maps,
                            characters = stats.characters,
                            ais = stats.ais,
                            connections = connections.connection_count(),
                            "server tick"
                        );
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    /// Initiates server shutdown.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Waits until the listeners are bound and returns their address.
    pub async fn wait_until_listening(&self) -> SocketAddr {
        let mut receiver = self.listening.subscribe();
        loop {
            if let Some(addr) = *receiver.borrow_and_update() {
                return addr;
            }
            if receiver.changed().await.is_err() {
                return self.config.bind_address;
            }
        }
    }

    pub fn world(&self) -> Arc<World> {
        self.world.clone()
    }

    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }
}
