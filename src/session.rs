use crate::{
    config::Config,
    directory::AttributeDirectory,
    transport::Transport,
    util::{ClientMessage, ServerMessage, TransferError},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::watch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Active,
    Closing,
}

#[derive(Debug)]
pub(crate) enum SessionEnd {
    /// The transport failed; the peer's entry has been erased.
    PeerGone(TransferError),
    /// The server asked the session to stop; the peer's entry is kept.
    Stopped,
}

pub(crate) struct Session<S = TcpStream> {
    transport: Transport<S>,
    directory: AttributeDirectory,
    peer: String,
    separator: char,
    write_ack: bool,
    state: SessionState,
    stop: watch::Receiver<bool>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        transport: Transport<S>,
        directory: AttributeDirectory,
        config: &Config,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let peer = transport.peer_address().to_string();
        Self {
            transport,
            directory,
            peer,
            separator: config.separator,
            write_ack: config.write_ack,
            state: SessionState::Active,
            stop,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) async fn run(&mut self) -> SessionEnd {
        tracing::info!("connected!");

        let end = loop {
            debug_assert_eq!(self.state, SessionState::Active);
            if *self.stop.borrow() {
                break SessionEnd::Stopped;
            }

            let res = match self.transport.receive().await {
                Ok(msg) => self.handle(&msg).await,
                Err(e) => Err(e),
            };
            if let Err(e) = res {
                self.directory.erase(&self.peer);
                break SessionEnd::PeerGone(e);
            }
        };

        self.state = SessionState::Closing;
        match &end {
            SessionEnd::PeerGone(e) => tracing::info!("disconnected! ({e})"),
            SessionEnd::Stopped => tracing::info!("stopped!"),
        }
        end
    }

    async fn handle(&mut self, msg: &str) -> Result<(), TransferError> {
        match ClientMessage::parse(msg, self.separator, self.transport.delimiter()) {
            ClientMessage::Empty => {
                tracing::trace!("heartbeat");
            }
            ClientMessage::Set(updates) => {
                tracing::debug!("set: {updates:?}");
                if !updates.is_empty() {
                    self.directory.set_attributes(&self.peer, updates);
                }
                if self.write_ack {
                    self.reply(ServerMessage::Ack).await?;
                }
            }
            ClientMessage::Get(target) if target.is_empty() => {
                tracing::trace!("get without target, ignoring");
            }
            ClientMessage::Get(target) => {
                let reply = match self.directory.lookup(&target) {
                    Some(map) => ServerMessage::found(&map, self.separator),
                    None => ServerMessage::NotFound,
                };
                tracing::debug!("get {target:?}: {reply:?}");
                self.reply(reply).await?;
            }
            ClientMessage::Unknown(prefix) => {
                tracing::debug!("unknown prefix {prefix:?}, ignoring");
            }
        }
        Ok(())
    }

    async fn reply(&mut self, msg: ServerMessage) -> Result<(), TransferError> {
        let framed = msg.frame(self.transport.delimiter());
        self.transport.set_payload(framed);
        tracing::trace!("sending {:?}", self.transport.payload());
        if let Err(e) = self.transport.send_pending().await {
            tracing::error!("connection interrupted! ({e:?})");
            return Err(e);
        }
        Ok(())
    }
}
