use crate::{config::Config, util::TransferError};
use std::{future::Future, io, net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

#[derive(Debug, Clone)]
pub(crate) struct Framing {
    pub(crate) delimiter: String,
    pub(crate) idle_timeout: Duration,
    pub(crate) max_length: usize,
}

impl From<&Config> for Framing {
    fn from(config: &Config) -> Self {
        Self {
            delimiter: config.delimiter.clone(),
            idle_timeout: config.idle_timeout,
            max_length: config.max_message_length,
        }
    }
}

/// One peer's connection: receives whole messages and sends a pending
/// outgoing payload.
pub struct Transport<S = TcpStream> {
    stream: BufReader<S>,
    peer: String,
    framing: Framing,
    payload: String,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S, peer: String, framing: Framing) -> Self {
        Self {
            stream: BufReader::new(stream),
            peer,
            framing,
            payload: String::new(),
        }
    }

    pub fn peer_address(&self) -> &str {
        &self.peer
    }

    pub fn delimiter(&self) -> &str {
        &self.framing.delimiter
    }

    /// Waits for the next complete message, without its delimiter.
    ///
    /// The whole message has to arrive within the idle timeout.
    pub async fn receive(&mut self) -> Result<String, TransferError> {
        match tokio::time::timeout(self.framing.idle_timeout, self.read_frame()).await {
            Ok(res) => res,
            Err(_) => Err(TransferError::TimedOut),
        }
    }

    async fn read_frame(&mut self) -> Result<String, TransferError> {
        let delimiter = self.framing.delimiter.as_bytes();
        let mut data = Vec::new();

        loop {
            let byte = match self.stream.read_u8().await {
                Ok(byte) => byte,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(TransferError::Disconnected)
                }
                Err(e) => return Err(TransferError::IOError(e)),
            };
            data.push(byte);

            if data.ends_with(delimiter) {
                data.truncate(data.len() - delimiter.len());
                break;
            }

            if data.len() >= self.framing.max_length {
                return Err(TransferError::TooLong);
            }
        }

        String::from_utf8(data).map_err(|_| TransferError::InvalidUtf8)
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: String) {
        self.payload = payload;
    }

    /// Writes out the pending payload and clears it.
    pub async fn send_pending(&mut self) -> Result<(), TransferError> {
        let payload = std::mem::take(&mut self.payload);
        let stream = self.stream.get_mut();
        stream.write_all(payload.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

pub(crate) struct Listener {
    listener: TcpListener,
    framing: Framing,
    key_with_port: bool,
}

impl Listener {
    pub(crate) async fn bind(config: &Config) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        Ok(Self {
            listener,
            framing: Framing::from(config),
            key_with_port: config.key_with_port,
        })
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub(crate) async fn accept(&self) -> io::Result<Transport<TcpStream>> {
        let (socket, addr) = self.listener.accept().await?;
        let peer = if self.key_with_port {
            addr.to_string()
        } else {
            addr.ip().to_string()
        };
        Ok(Transport::new(socket, peer, self.framing.clone()))
    }
}

/// Source of freshly connected peers.
pub(crate) trait Incoming: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<Transport<Self::Stream>>> + Send;
}

impl Incoming for Listener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<Transport<TcpStream>>> + Send {
        Listener::accept(self)
    }
}
