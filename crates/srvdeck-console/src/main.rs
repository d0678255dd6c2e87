mod app;
mod channel;
mod config;
mod logging;
mod theme;
mod ui;

use app::{handle_input, App};
use channel::WsChannel;
use clap::Parser;
use config::{load_config, Args};
use crossterm::{
    event::{
        DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange,
        EventStream,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use logging::init_logging;
use ratatui::{backend::CrosstermBackend, Terminal};
use srvdeck_core::protocol::CommandCodec;
use std::{error::Error, io};
use tokio::sync::mpsc;
use tracing::{info, warn};
use ui::{render_ui, CellMeasure};

const CHANNEL_EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config(Args::parse())?;
    let log_guard = init_logging(&config);
    info!(
        event = "startup",
        url = %config.url,
        log_file = ?log_guard.as_ref().and_then(|guard| guard.path.as_deref()),
        encoding = config.encoding.as_str(),
        max_frame_bytes = config.max_frame_bytes
    );

    let (channel_tx, mut channel_rx) = mpsc::channel(CHANNEL_EVENT_CAPACITY);
    let codec = CommandCodec::new(config.encoding, config.max_frame_bytes);
    let channel = WsChannel::new(config.url.clone(), codec, channel_tx);
    let mut app = App::new(channel, config.timestamps);
    app.start(&CellMeasure);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableBracketedPaste,
        EnableFocusChange
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();

    let result = async {
        loop {
            app.sync_channel();
            if app.take_dirty() {
                terminal.draw(|frame| render_ui(frame, &app))?;
            }
            tokio::select! {
                Some(event) = channel_rx.recv() => {
                    app.apply_channel_event(event);
                }
                maybe_event = events.next() => {
                    match maybe_event {
                        Some(Ok(event)) => {
                            if handle_input(event, &mut app) {
                                break;
                            }
                        }
                        Some(Err(err)) => warn!(event = "terminal_event_error", error = %err),
                        None => break,
                    }
                }
            }
        }
        Ok::<(), Box<dyn Error>>(())
    }
    .await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    info!(event = "shutdown");
    result
}
