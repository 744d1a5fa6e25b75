use crate::{
    config::Config,
    directory::AttributeDirectory,
    session::{Session, SessionEnd},
    transport::{Incoming, Listener},
    util::ServerError,
};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle, JoinSet},
};
use tracing::Instrument;

/// Admits peers and runs one session task per connection.
pub struct Acceptor {
    config: Config,
    directory: AttributeDirectory,
    local_addr: Option<SocketAddr>,
    stop: watch::Sender<bool>,
    finished: Option<watch::Receiver<()>>,
    accept_loop: Option<JoinHandle<Result<(), ServerError>>>,
    active: Arc<AtomicUsize>,
}

impl Acceptor {
    pub fn new(config: Config) -> Self {
        Self::with_directory(config, AttributeDirectory::new())
    }

    pub fn with_directory(config: Config, directory: AttributeDirectory) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            config,
            directory,
            local_addr: None,
            stop,
            finished: None,
            accept_loop: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn directory(&self) -> &AttributeDirectory {
        &self.directory
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of sessions that have been spawned and not yet reaped.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.accept_loop.is_some()
    }

    /// Binds the listener and spawns the accept loop.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.accept_loop.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        if self.config.delimiter.is_empty() {
            return Err(ServerError::EmptyDelimiter);
        }

        let addr = self.config.listen_addr();
        let bind_err = |source| ServerError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = Listener::bind(&self.config).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        tracing::info!("listening on {local_addr}");

        self.launch(listener, local_addr);
        Ok(local_addr)
    }

    fn launch<L: Incoming>(&mut self, listener: L, local_addr: SocketAddr) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(());
        self.stop = stop_tx;
        self.finished = Some(done_rx);
        self.local_addr = Some(local_addr);
        self.active.store(0, Ordering::Relaxed);

        let ctx = LoopContext {
            listener,
            directory: self.directory.clone(),
            config: self.config.clone(),
            stop: stop_rx,
            active: Arc::clone(&self.active),
            done: done_tx,
        };
        self.accept_loop = Some(tokio::spawn(
            accept_loop(ctx).instrument(tracing::info_span!("acceptor", addr = %local_addr)),
        ));
    }

    /// Resolves once no more peers are admitted, either through `stop` or
    /// because accepting failed. Sessions may still be running; `stop` waits
    /// for them.
    pub async fn closed(&self) {
        let Some(finished) = &self.finished else {
            return;
        };
        let mut finished = finished.clone();
        while finished.changed().await.is_ok() {}
    }

    /// Stops admitting peers and waits for every session to end on its own.
    ///
    /// Returns the accept loop's error if accepting had failed. Calling it
    /// again, or before `start`, does nothing.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let Some(handle) = self.accept_loop.take() else {
            return Ok(());
        };
        tracing::info!("stopping...");
        self.stop.send_replace(true);
        let res = match handle.await {
            Ok(res) => res,
            Err(e) => {
                tracing::error!("accept loop panicked: {e}");
                Err(ServerError::Panicked)
            }
        };
        tracing::info!("stopped!");
        res
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        // cannot wait here; at least stop admitting peers
        self.stop.send_replace(true);
    }
}

struct LoopContext<L> {
    listener: L,
    directory: AttributeDirectory,
    config: Config,
    stop: watch::Receiver<bool>,
    active: Arc<AtomicUsize>,
    done: watch::Sender<()>,
}

async fn accept_loop<L: Incoming>(mut ctx: LoopContext<L>) -> Result<(), ServerError> {
    let mut sessions = JoinSet::new();

    let res = loop {
        tokio::select! {
            _ = ctx.stop.changed() => break Ok(()),
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                reap(joined);
                ctx.active.store(sessions.len(), Ordering::Relaxed);
            }
            accepted = ctx.listener.accept() => {
                let transport = match accepted {
                    Ok(transport) => transport,
                    Err(e) => {
                        tracing::error!("failed to accept connection: {e}");
                        break Err(ServerError::Accept(e));
                    }
                };
                let peer = transport.peer_address().to_string();
                tracing::info!("accepted: {peer}");
                let mut session = Session::new(
                    transport,
                    ctx.directory.clone(),
                    &ctx.config,
                    ctx.stop.clone(),
                );
                sessions.spawn(
                    async move { session.run().await }
                        .instrument(tracing::info_span!("session", peer = %peer)),
                );
                ctx.active.store(sessions.len(), Ordering::Relaxed);
            }
        }
    };
    // wakes `closed()` before the drain below
    drop(ctx.done);

    tracing::debug!("waiting for {} sessions", sessions.len());
    while let Some(joined) = sessions.join_next().await {
        reap(joined);
        ctx.active.store(sessions.len(), Ordering::Relaxed);
    }
    res
}

fn reap(joined: Result<SessionEnd, JoinError>) {
    match joined {
        Ok(SessionEnd::PeerGone(e)) => tracing::debug!("session reaped, peer gone: {e}"),
        Ok(SessionEnd::Stopped) => tracing::debug!("session reaped after stop"),
        Err(e) => tracing::error!("session panicked: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Framing, Transport};
    use std::{io, time::Duration};
    use tokio::{
        io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream},
        sync::mpsc,
        time::{sleep, timeout},
    };

    type Scripted = mpsc::UnboundedReceiver<io::Result<Transport<DuplexStream>>>;

    impl Incoming for Scripted {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<Transport<DuplexStream>> {
            match self.recv().await {
                Some(accepted) => accepted,
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn accept_failure_is_reported_while_peers_keep_talking() {
        let config = Config::default();
        let mut acceptor = Acceptor::new(config.clone());
        let (incoming, scripted) = mpsc::unbounded_channel();
        acceptor.launch::<Scripted>(scripted, "127.0.0.1:3000".parse().unwrap());

        let (server, client) = duplex(1024);
        let transport = Transport::new(server, "10.0.0.1".to_string(), Framing::from(&config));
        incoming.send(Ok(transport)).unwrap();

        let mut client = BufReader::new(client);
        client.write_all(b"set,battery=80\n").await.unwrap();
        let mut ack = String::new();
        timeout(Duration::from_secs(1), client.read_line(&mut ack))
            .await
            .expect("no ack")
            .unwrap();
        assert_eq!(ack, "\n");

        // keep the session busy with heartbeats until the server hangs up
        let chatter = tokio::spawn(async move {
            while client.write_all(b"\n").await.is_ok() {
                sleep(Duration::from_millis(20)).await;
            }
        });

        incoming
            .send(Err(io::Error::new(io::ErrorKind::Other, "too many open files")))
            .unwrap();

        timeout(Duration::from_secs(1), acceptor.closed())
            .await
            .expect("accept failure went unnoticed");
        assert_eq!(acceptor.active_sessions(), 1);

        let res = timeout(Duration::from_secs(1), acceptor.stop())
            .await
            .expect("stop hung");
        assert!(matches!(res, Err(ServerError::Accept(_))));
        assert_eq!(acceptor.active_sessions(), 0);
        // a stopped session keeps its entry
        assert!(acceptor.directory().contains("10.0.0.1"));

        timeout(Duration::from_secs(1), chatter)
            .await
            .expect("session still running")
            .unwrap();
    }
}
