use chrono::Local;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use srvdeck_core::console::{ConsoleInput, ConsoleOp, GlyphMeasure, TimestampSource};
use srvdeck_core::controller::{Effects, SessionController, SessionEvent};
use srvdeck_core::session::{ChannelEvent, ChannelSession, ChannelState};
use tracing::debug;

const SCROLL_STEP: usize = 10;

pub struct App<C: ChannelSession> {
    pub controller: SessionController,
    pub console: ConsoleInput,
    /// Console lines hidden below the viewport.
    pub scroll_back: usize,
    channel: C,
    dirty: bool,
}

impl<C: ChannelSession> App<C> {
    pub fn new(channel: C, timestamps: TimestampSource) -> Self {
        Self {
            controller: SessionController::new(),
            console: ConsoleInput::new(timestamps),
            scroll_back: 0,
            channel,
            dirty: true,
        }
    }

    pub fn start(&mut self, measure: &dyn GlyphMeasure) {
        self.console.init(measure);
        self.console.focus();
        self.channel.init();
    }

    /// Refreshes the stats panel's connection label from the live channel.
    pub fn sync_channel(&mut self) {
        let before = self.controller.stats().channel;
        self.controller.sync_channel(self.channel.state());
        if self.controller.stats().channel != before {
            self.dirty = true;
        }
    }

    /// True once after anything visible changed.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn apply_channel_event(&mut self, event: ChannelEvent) {
        let event = match event {
            ChannelEvent::Opened => SessionEvent::Opened,
            ChannelEvent::Closed => SessionEvent::Closed,
            ChannelEvent::RawText(text) => SessionEvent::RawText(text),
            ChannelEvent::Command(envelope) => SessionEvent::Command(envelope),
        };
        self.dispatch(event);
    }

    pub fn dispatch(&mut self, event: SessionEvent) {
        let effects = self.controller.handle(event);
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Effects) {
        if !effects.is_empty() {
            self.dirty = true;
        }
        if let Some(mode) = effects.input {
            self.console.set_mode(mode);
        }
        let now = Local::now();
        for op in &effects.console {
            if matches!(op, ConsoleOp::Replace(_)) {
                self.scroll_back = 0;
            }
            self.console.apply(op, now);
        }
        for command in &effects.outgoing {
            if let Err(err) = self.channel.send(command) {
                debug!(event = "command_dropped", kind = command.tag(), error = %err);
            }
        }
    }

    pub fn submit(&mut self) {
        let color = self.controller.self_color();
        if let Some(text) = self.console.submit(Local::now(), color) {
            self.scroll_back = 0;
            self.dispatch(SessionEvent::Submit(text));
        }
    }

    /// Moves the selection to the neighbouring tab, wrapping around.
    pub fn select_relative(&mut self, delta: isize) {
        let tabs = self.controller.tabs().tabs();
        if tabs.is_empty() {
            return;
        }
        let current = tabs.iter().position(|tab| tab.active).unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(tabs.len() as isize) as usize;
        let id = tabs[next].instance_id.clone();
        self.dispatch(SessionEvent::Select(id));
    }

    /// Reopens the channel after it closed. Nothing retries on its own.
    pub fn reconnect(&mut self) {
        if self.channel.state() == ChannelState::Closed {
            self.channel.init();
        }
    }

    pub fn scroll_up(&mut self) {
        let max = self.console.lines().len().saturating_sub(1);
        self.scroll_back = (self.scroll_back + SCROLL_STEP).min(max);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_back = self.scroll_back.saturating_sub(SCROLL_STEP);
    }
}

/// Returns true when the app should quit.
pub fn handle_input<C: ChannelSession>(event: Event, app: &mut App<C>) -> bool {
    app.dirty = true;
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, app),
        Event::Paste(text) => {
            app.console.insert_str(&text);
            false
        }
        Event::FocusGained => {
            app.console.focus();
            false
        }
        Event::FocusLost => {
            app.console.blur();
            false
        }
        _ => false,
    }
}

fn handle_key<C: ChannelSession>(key: KeyEvent, app: &mut App<C>) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    if ctrl {
        match key.code {
            KeyCode::Char('c') => return true,
            KeyCode::Char('r') => app.reconnect(),
            KeyCode::Char('t') => app.dispatch(SessionEvent::CreateServer),
            KeyCode::Char('l') => app.dispatch(SessionEvent::RefreshList),
            KeyCode::Char('a') => app.console.select_all(),
            _ => {}
        }
        return false;
    }

    match key.code {
        KeyCode::Esc => return true,
        KeyCode::Enter => app.submit(),
        KeyCode::Tab => app.select_relative(1),
        KeyCode::BackTab => app.select_relative(-1),
        KeyCode::Backspace => app.console.backspace(),
        KeyCode::Delete => app.console.delete_forward(),
        KeyCode::Left => app.console.move_left(shift),
        KeyCode::Right => app.console.move_right(shift),
        KeyCode::Home => app.console.move_home(shift),
        KeyCode::End => app.console.move_end(shift),
        KeyCode::PageUp => app.scroll_up(),
        KeyCode::PageDown => app.scroll_down(),
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::ALT) => {
            app.console.insert_char(ch);
        }
        _ => {}
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use srvdeck_core::console::BodySegment;
    use srvdeck_core::protocol::{ClientCommand, CommandLine, Envelope, LineKind};
    use srvdeck_core::session::ChannelError;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingChannel {
        state: Cell<ChannelState>,
        inits: Cell<usize>,
        sent: RefCell<Vec<ClientCommand>>,
    }

    impl ChannelSession for RecordingChannel {
        fn init(&mut self) {
            self.inits.set(self.inits.get() + 1);
            self.state.set(ChannelState::Connecting);
        }

        fn send(&self, command: &ClientCommand) -> Result<(), ChannelError> {
            if self.state.get() != ChannelState::Open {
                return Err(ChannelError::NotOpen);
            }
            self.sent.borrow_mut().push(command.clone());
            Ok(())
        }

        fn state(&self) -> ChannelState {
            self.state.get()
        }
    }

    struct Cells;

    impl GlyphMeasure for Cells {
        fn text_width(&self, text: &str) -> f32 {
            text.chars().count() as f32
        }
    }

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(ch: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL))
    }

    fn connected_app() -> App<RecordingChannel> {
        let mut app = App::new(RecordingChannel::default(), TimestampSource::Render);
        app.start(&Cells);
        app.channel.state.set(ChannelState::Open);
        app.apply_channel_event(ChannelEvent::Opened);
        app.apply_channel_event(ChannelEvent::Command(Envelope::new(
            "ServerList",
            Some(json!([{"id": "s1", "name": "Alpha"}, {"id": "s2", "name": "Bravo"}])),
        )));
        app.channel.sent.borrow_mut().clear();
        app
    }

    fn sent(app: &App<RecordingChannel>) -> Vec<ClientCommand> {
        app.channel.sent.borrow().clone()
    }

    #[test]
    fn typing_help_echoes_and_sends_one_command() {
        let mut app = connected_app();
        for ch in "help".chars() {
            handle_input(press(KeyCode::Char(ch)), &mut app);
        }
        handle_input(press(KeyCode::Enter), &mut app);

        let last = app.console.lines().last().expect("echo line");
        assert_eq!(last.kind, LineKind::In);
        assert_eq!(last.body, vec![BodySegment::Text("help".to_string())]);
        assert_eq!(app.console.buffer(), "");
        assert_eq!(
            sent(&app),
            vec![ClientCommand::Command(CommandLine {
                id: "s1".to_string(),
                cmd: "help".to_string(),
            })]
        );
    }

    #[test]
    fn reconnect_restores_the_server_side_selection() {
        let mut app = connected_app();
        app.channel.state.set(ChannelState::Closed);
        app.apply_channel_event(ChannelEvent::Closed);
        handle_input(ctrl('r'), &mut app);
        app.channel.state.set(ChannelState::Open);
        app.apply_channel_event(ChannelEvent::Opened);
        app.apply_channel_event(ChannelEvent::Command(Envelope::new(
            "Identity",
            Some(json!({"hue": 3})),
        )));
        app.apply_channel_event(ChannelEvent::Command(Envelope::new(
            "ServerList",
            Some(json!([{"id": "s1", "name": "Alpha"}, {"id": "s2", "name": "Bravo"}])),
        )));

        assert_eq!(
            sent(&app),
            vec![
                ClientCommand::ListServers,
                ClientCommand::SetServer("s1".to_string()),
                ClientCommand::ServerLog,
                ClientCommand::Status("s1".to_string()),
            ]
        );
        assert!(!app.console.is_read_only());
    }

    #[test]
    fn redraw_only_after_visible_changes() {
        let mut app = connected_app();
        assert!(app.take_dirty());
        assert!(!app.take_dirty());

        app.apply_channel_event(ChannelEvent::Command(Envelope::new(
            "ServerLog",
            Some(json!({"server_id": "s2", "page_no": 0, "messages": [{"text": "bg", "kind": "out"}]})),
        )));
        app.sync_channel();
        assert!(!app.take_dirty());

        app.apply_channel_event(ChannelEvent::Command(Envelope::new(
            "ServerList",
            Some(json!([{"id": "s2", "name": "Bravo Two"}])),
        )));
        assert!(app.take_dirty());

        app.channel.state.set(ChannelState::Closed);
        app.sync_channel();
        assert!(app.take_dirty());

        handle_input(press(KeyCode::Char('x')), &mut app);
        assert!(app.take_dirty());
    }

    #[test]
    fn tab_switches_instance() {
        let mut app = connected_app();
        handle_input(press(KeyCode::Tab), &mut app);
        assert_eq!(
            sent(&app),
            vec![
                ClientCommand::Status("s2".to_string()),
                ClientCommand::SetServer("s2".to_string()),
                ClientCommand::ServerLog,
            ]
        );
        assert_eq!(app.controller.registry().selected(), Some("s2"));

        handle_input(press(KeyCode::BackTab), &mut app);
        assert_eq!(app.controller.registry().selected(), Some("s1"));
    }

    #[test]
    fn close_makes_input_read_only_and_drops_sends() {
        let mut app = connected_app();
        app.channel.state.set(ChannelState::Closed);
        app.apply_channel_event(ChannelEvent::Closed);
        assert!(app.console.is_read_only());

        handle_input(press(KeyCode::Char('x')), &mut app);
        handle_input(ctrl('l'), &mut app);
        assert_eq!(app.console.buffer(), "");
        assert!(sent(&app).is_empty());
    }

    #[test]
    fn ctrl_r_reconnects_only_when_closed() {
        let mut app = connected_app();
        handle_input(ctrl('r'), &mut app);
        assert_eq!(app.channel.inits.get(), 1);

        app.channel.state.set(ChannelState::Closed);
        handle_input(ctrl('r'), &mut app);
        assert_eq!(app.channel.inits.get(), 2);
        assert_eq!(app.channel.state(), ChannelState::Connecting);
    }

    #[test]
    fn control_keys_map_to_commands() {
        let mut app = connected_app();
        handle_input(ctrl('t'), &mut app);
        handle_input(ctrl('l'), &mut app);
        assert_eq!(
            sent(&app),
            vec![ClientCommand::CreateServer, ClientCommand::ListServers]
        );
        assert!(handle_input(ctrl('c'), &mut app));
        assert!(handle_input(press(KeyCode::Esc), &mut app));
    }

    #[test]
    fn shift_arrows_extend_selection() {
        let mut app = connected_app();
        handle_input(Event::Paste("status".to_string()), &mut app);
        let shift_left = Event::Key(KeyEvent::new(KeyCode::Left, KeyModifiers::SHIFT));
        handle_input(shift_left.clone(), &mut app);
        handle_input(shift_left, &mut app);
        assert_eq!(app.console.selection(), (4, 6));
        handle_input(press(KeyCode::Char('!')), &mut app);
        assert_eq!(app.console.buffer(), "stat!");
    }

    #[test]
    fn selected_server_log_replaces_console() {
        let mut app = connected_app();
        app.scroll_back = 3;
        app.apply_channel_event(ChannelEvent::Command(Envelope::new(
            "ServerLog",
            Some(json!({"server_id": "s1", "page_no": 0, "messages": [{"text": "ok", "kind": "out"}]})),
        )));
        assert_eq!(app.console.lines().len(), 1);
        assert_eq!(app.scroll_back, 0);
    }
}
