use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::session::{InputSender, SessionInput};
use crate::signaling::{decode_frame, SignalMessage, SignalingChannel};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// Signaling over one WebSocket. Inbound frames are decoded on a reader
/// task and pushed into the session queue; the sink is shared with the
/// keepalive task.
pub struct WsSignalingChannel {
    sink: WsSink,
    reader: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
    closed: bool,
}

impl WsSignalingChannel {
    pub async fn connect(
        url: &str,
        inbox: InputSender,
        keepalive: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;
        info!("signaling connected to {url}");

        let (sink, stream) = ws.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));
        let reader = tokio::spawn(read_loop(stream, inbox));

        let keepalive = keepalive.map(|period| {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = sink.lock().await.send(Message::Ping(Vec::new().into())).await {
                        debug!("keepalive stopped: {e}");
                        break;
                    }
                }
            })
        });

        Ok(Self {
            sink,
            reader,
            keepalive,
            closed: false,
        })
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, inbox: InputSender) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                Ok(Some(message)) => {
                    debug!("signaling <- {}", message.name());
                    if !inbox.send(SessionInput::Signal(message)) {
                        return;
                    }
                }
                Ok(None) => debug!("skipping unknown signaling event"),
                Err(e) => {
                    warn!("bad signaling frame: {e}");
                    if !inbox.send(SessionInput::Malformed(e)) {
                        return;
                    }
                }
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| f.reason.as_str().to_owned())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by service".to_owned());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_owned(),
        }
    };
    warn!("signaling channel lost: {reason}");
    inbox.send(SessionInput::TransportClosed(reason));
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn send(&mut self, message: SignalMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed("channel disconnected".into()));
        }
        let text = message.to_frame()?;
        debug!("signaling -> {}", message.name());
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send {
                event: message.name(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.abort();
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!("close frame not sent: {e}");
        }
        let _ = sink.close().await;
        info!("signaling disconnected");
    }
}

impl Drop for WsSignalingChannel {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
        }
    }
}
