use futures_util::{SinkExt, StreamExt};
use srvdeck_core::protocol::{ClientCommand, CommandCodec, Decoded, Frame};
use srvdeck_core::session::{ChannelError, ChannelEvent, ChannelSession, ChannelState};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSING: u8 = 2;
const CLOSED: u8 = 3;

/// Websocket implementation of `ChannelSession`. One background task per
/// connection moves frames; the ready-state cell is the only thing it shares.
pub struct WsChannel {
    url: Url,
    codec: CommandCodec,
    events: mpsc::Sender<ChannelEvent>,
    state_tx: Arc<watch::Sender<u8>>,
    state_rx: watch::Receiver<u8>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

impl WsChannel {
    pub fn new(url: Url, codec: CommandCodec, events: mpsc::Sender<ChannelEvent>) -> Self {
        let (state_tx, state_rx) = watch::channel(CONNECTING);
        Self {
            url,
            codec,
            events,
            state_tx: Arc::new(state_tx),
            state_rx,
            outbound: None,
        }
    }
}

impl ChannelSession for WsChannel {
    fn init(&mut self) {
        if self.outbound.is_some() && self.state() != ChannelState::Closed {
            debug!(event = "channel_init_skipped", state = ?self.state());
            return;
        }
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);
        self.state_tx.send_replace(CONNECTING);
        info!(event = "channel_connecting", url = %self.url);
        tokio::spawn(channel_loop(
            self.url.clone(),
            self.codec,
            self.events.clone(),
            self.state_tx.clone(),
            outbound_rx,
        ));
    }

    fn send(&self, command: &ClientCommand) -> Result<(), ChannelError> {
        if self.state() != ChannelState::Open {
            return Err(ChannelError::NotOpen);
        }
        let frame = self.codec.encode(command)?;
        let outbound = self.outbound.as_ref().ok_or(ChannelError::NotOpen)?;
        outbound.send(frame).map_err(|_| ChannelError::NotOpen)
    }

    fn state(&self) -> ChannelState {
        ChannelState::from_ready_state(*self.state_rx.borrow())
    }
}

async fn channel_loop(
    url: Url,
    codec: CommandCodec,
    events: mpsc::Sender<ChannelEvent>,
    state: Arc<watch::Sender<u8>>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(err) => {
            warn!(event = "channel_connect_error", url = %url, error = %err);
            state.send_replace(CLOSED);
            let _ = events.send(ChannelEvent::Closed).await;
            return;
        }
    };
    state.send_replace(OPEN);
    info!(event = "channel_open", url = %url);
    if events.send(ChannelEvent::Opened).await.is_err() {
        state.send_replace(CLOSED);
        return;
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            incoming = stream.next() => {
                let frame = match incoming {
                    Some(Ok(Message::Text(text))) => Frame::Text(text),
                    Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes),
                    Some(Ok(Message::Close(_))) => {
                        state.send_replace(CLOSING);
                        break;
                    }
                    None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(event = "channel_read_error", error = %err);
                        break;
                    }
                };
                if !deliver(&codec, &frame, &events).await {
                    break;
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    state.send_replace(CLOSING);
                    let _ = sink.close().await;
                    break;
                };
                let message = match frame {
                    Frame::Text(text) => Message::Text(text),
                    Frame::Binary(bytes) => Message::Binary(bytes),
                };
                if let Err(err) = sink.send(message).await {
                    warn!(event = "channel_write_error", error = %err);
                    break;
                }
            }
        }
    }

    state.send_replace(CLOSED);
    info!(event = "channel_closed", url = %url);
    let _ = events.send(ChannelEvent::Closed).await;
}

/// Returns false once nobody listens for events anymore.
async fn deliver(codec: &CommandCodec, frame: &Frame, events: &mpsc::Sender<ChannelEvent>) -> bool {
    let event = match codec.decode(frame) {
        Ok(Decoded::Command(envelope)) => ChannelEvent::Command(envelope),
        Ok(Decoded::Raw(text)) => {
            warn!(event = "frame_not_envelope", bytes = text.len());
            ChannelEvent::RawText(text)
        }
        Err(err) => {
            warn!(event = "frame_rejected", error = %err);
            return true;
        }
    };
    events.send(event).await.is_ok()
}
