//! Message-oriented transport to an upstream node.
//!
//! The link driver only ever sees a [`Connection`]: a sink of outgoing text frames and a stream of incoming text
//! frames. [`WsConnector`] provides it over WebSocket, tests plug their own [`Connector`].

use crate::error::{ConnectError, TransportError};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::{fmt, pin::Pin};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

pub type BoxSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type BoxStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open connection. The stream ends when the peer closes the connection.
pub struct Connection {
    pub sink: BoxSink,
    pub stream: BoxStream,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        sink: impl Sink<String, Error = TransportError> + Send + 'static,
        stream: impl Stream<Item = Result<String, TransportError>> + Send + 'static,
    ) -> Self {
        Self { sink: Box::pin(sink), stream: Box::pin(stream) }
    }
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<Connection, ConnectError>;
}

/// Dials `ws://` and `wss://` endpoints.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn parse_endpoint(endpoint: &str) -> Result<Url, ConnectError> {
        let invalid = |reason: String| ConnectError::InvalidEndpoint { endpoint: endpoint.to_string(), reason };

        let url = up_utils::parsers::parse_url(endpoint).map_err(|err| invalid(err.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(invalid(format!("unsupported scheme {scheme:?}, expected ws or wss"))),
        }
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection, ConnectError> {
        let url = Self::parse_endpoint(endpoint)?;
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str()).await.map_err(TransportError::from)?;
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(TransportError::from)
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));
        let stream = stream
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(|message| future::ready(decode(message)));

        Ok(Connection::new(sink, stream))
    }
}

/// Text frames are passed through and binary frames are read as UTF-8. Control frames are handled by tungstenite.
fn decode(message: Result<Message, tungstenite::Error>) -> Option<Result<String, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => Some(String::from_utf8(bytes).map_err(TransportError::from)),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Close(_)) => None,
        Err(err) => Some(Err(err.into())),
    }
}
