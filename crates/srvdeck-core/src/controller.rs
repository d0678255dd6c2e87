use crate::color::{color_of, Hsla, NEUTRAL};
use crate::console::{ConsoleOp, InputMode};
use crate::protocol::{
    ClientCommand, CommandError, CommandLine, Envelope, ForeignCommand, InstanceRecord,
    LineKind, LogLine, ServerCommand, ServerLogPage,
};
use crate::registry::{InstanceRegistry, PageUpdate};
use crate::session::{ChannelState, ChannelStatus};
use crate::stats::StatsModel;
use crate::tabs::TabStrip;
use tracing::{debug, error, info, warn};

pub const CONNECTED_MESSAGE: &str = "Connected to Websocket.";
pub const CLOSED_MESSAGE: &str = "Websocket connection closed.";
pub const CONNECT_FAILED_MESSAGE: &str = "Could not connect to Websocket.";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    Closed,
    RawText(String),
    Command(Envelope),
    /// Text the console already echoed locally.
    Submit(String),
    Select(String),
    CreateServer,
    RefreshList,
}

/// What the caller has to do after one dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    pub outgoing: Vec<ClientCommand>,
    pub console: Vec<ConsoleOp>,
    pub input: Option<InputMode>,
    pub tabs_changed: bool,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
            && self.console.is_empty()
            && self.input.is_none()
            && !self.tabs_changed
    }

    fn send(&mut self, command: ClientCommand) {
        self.outgoing.push(command);
    }

    fn show(&mut self, line: LogLine) {
        self.console.push(ConsoleOp::Append(line));
    }
}

/// Owns the instance registry, stats model and tab strip, and turns channel
/// and user events into state changes plus `Effects`.
#[derive(Debug, Default)]
pub struct SessionController {
    registry: InstanceRegistry,
    stats: StatsModel,
    tabs: TabStrip,
    connected: bool,
    /// A fresh connection starts without a server-side selection, so the
    /// local one is re-announced on the next list.
    resync_pending: bool,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &StatsModel {
        &self.stats
    }

    pub fn tabs(&self) -> &TabStrip {
        &self.tabs
    }

    /// Mirrors the transport state into the stats panel.
    pub fn sync_channel(&mut self, state: ChannelState) {
        self.stats.channel = state.status();
    }

    /// Color of this client's own lines, once the server sent an identity.
    pub fn self_color(&self) -> Option<Hsla> {
        self.stats.self_hue().map(color_of)
    }

    pub fn handle(&mut self, event: SessionEvent) -> Effects {
        let mut effects = Effects::default();
        match event {
            SessionEvent::Opened => self.on_opened(&mut effects),
            SessionEvent::Closed => self.on_closed(&mut effects),
            SessionEvent::RawText(text) => {
                let color = self.self_color();
                self.local_line(&mut effects, text, LineKind::Out, color);
            }
            SessionEvent::Command(envelope) => self.dispatch(envelope, &mut effects),
            SessionEvent::Submit(text) => self.on_submit(text, &mut effects),
            SessionEvent::Select(id) => self.on_select(&id, &mut effects),
            SessionEvent::CreateServer => effects.send(ClientCommand::CreateServer),
            SessionEvent::RefreshList => effects.send(ClientCommand::ListServers),
        }
        effects
    }

    fn on_opened(&mut self, effects: &mut Effects) {
        info!(event = "channel_opened");
        self.connected = true;
        self.resync_pending = self.registry.selected().is_some();
        self.stats.channel = ChannelStatus::Connected;
        effects.input = Some(InputMode::ReadWrite);
        self.local_line(effects, CONNECTED_MESSAGE.to_string(), LineKind::Meta, None);
    }

    fn on_closed(&mut self, effects: &mut Effects) {
        let message = if self.connected {
            CLOSED_MESSAGE
        } else {
            CONNECT_FAILED_MESSAGE
        };
        info!(event = "channel_closed", was_connected = self.connected);
        self.connected = false;
        self.stats.channel = ChannelStatus::Disconnected;
        effects.input = Some(InputMode::ReadOnly);
        self.local_line(effects, message.to_string(), LineKind::Meta, None);
    }

    fn dispatch(&mut self, envelope: Envelope, effects: &mut Effects) {
        let command = match envelope.into_server_command() {
            Ok(command) => command,
            Err(CommandError::UnknownType(kind)) => {
                error!(event = "command_unknown_type", kind = %kind);
                return;
            }
            Err(err @ CommandError::InvalidBody { .. }) => {
                warn!(event = "command_invalid_body", error = %err);
                return;
            }
        };
        match command {
            ServerCommand::Print(text) => {
                self.local_line(effects, text, LineKind::Meta, None);
            }
            ServerCommand::Status(partial) => self.stats.merge(partial),
            ServerCommand::Identity(identity) => {
                debug!(event = "identity_received", hue = identity.hue);
                self.stats.identity = Some(identity);
                effects.send(ClientCommand::ListServers);
            }
            ServerCommand::ForeignCommand(foreign) => self.on_foreign_command(foreign, effects),
            ServerCommand::ServerList(list) => self.on_server_list(list, effects),
            ServerCommand::ServerLog(page) => self.on_server_log(page, effects),
        }
    }

    fn on_foreign_command(&mut self, foreign: ForeignCommand, effects: &mut Effects) {
        let color = match self.stats.client_hue(&foreign.id) {
            Some(hue) => color_of(hue),
            None => {
                warn!(event = "participant_color_missing", participant = %foreign.id);
                NEUTRAL
            }
        };
        self.local_line(effects, foreign.cmd, LineKind::In, Some(color));
        self.local_line(effects, foreign.out, LineKind::Out, Some(color));
    }

    fn on_server_list(&mut self, list: Vec<InstanceRecord>, effects: &mut Effects) {
        let outcome = self.registry.apply_server_list(list);
        let selected = self.registry.selected().map(str::to_string);

        for id in &outcome.created {
            let Some(instance) = self.registry.get(id) else {
                continue;
            };
            let active = selected.as_deref() == Some(id.as_str());
            let handle = self.tabs.create(id, &instance.name, active);
            self.registry.attach_tab(id, handle);
            effects.tabs_changed = true;
        }
        for instance in self.registry.iter() {
            if let Some(handle) = instance.tab {
                if self.tabs.relabel(handle, &instance.name) {
                    effects.tabs_changed = true;
                }
            }
        }

        if let Some(id) = outcome.auto_selected {
            info!(event = "instance_auto_selected", instance = %id);
            self.activate_tab(&id, effects);
            effects.send(ClientCommand::SetServer(id));
            effects.send(ClientCommand::ServerLog);
        } else if self.resync_pending {
            if let Some(id) = selected.clone() {
                info!(event = "instance_resynced", instance = %id);
                self.activate_tab(&id, effects);
                effects.send(ClientCommand::SetServer(id));
                effects.send(ClientCommand::ServerLog);
            }
        }
        self.resync_pending = false;
        if let Some(id) = selected {
            effects.send(ClientCommand::Status(id));
        }
    }

    fn on_server_log(&mut self, page: ServerLogPage, effects: &mut Effects) {
        let ServerLogPage {
            server_id,
            page_no,
            messages,
        } = page;
        match self.registry.apply_server_log(&server_id, page_no, messages) {
            PageUpdate::UnknownInstance => {
                debug!(event = "server_log_unknown_instance", instance = %server_id, page_no);
            }
            PageUpdate::Stored { selected: false } => {}
            PageUpdate::Stored { selected: true } => {
                if let Some(transcript) = self.registry.rebuild_transcript(&server_id) {
                    effects.console.push(ConsoleOp::Replace(transcript));
                }
            }
        }
    }

    fn on_submit(&mut self, text: String, effects: &mut Effects) {
        let Some(selected) = self.registry.selected().map(str::to_string) else {
            debug!(event = "submit_without_selection");
            return;
        };
        let color = self.self_color();
        self.registry.append_local(&text, LineKind::In, color);
        effects.send(ClientCommand::Command(CommandLine {
            id: selected,
            cmd: text,
        }));
    }

    fn on_select(&mut self, id: &str, effects: &mut Effects) {
        if self.registry.selected() == Some(id) || !self.registry.contains(id) {
            return;
        }
        effects.send(ClientCommand::Status(id.to_string()));
        self.registry.select(id);
        self.activate_tab(id, effects);
        effects.send(ClientCommand::SetServer(id.to_string()));
        effects.send(ClientCommand::ServerLog);
    }

    fn activate_tab(&mut self, id: &str, effects: &mut Effects) {
        let Some(handle) = self.registry.get(id).and_then(|instance| instance.tab) else {
            return;
        };
        if self.tabs.active() != Some(handle) {
            self.tabs.activate(handle);
            effects.tabs_changed = true;
        }
    }

    /// Records a locally produced line and renders it.
    fn local_line(
        &mut self,
        effects: &mut Effects,
        text: String,
        kind: LineKind,
        color: Option<Hsla>,
    ) {
        self.registry.append_local(&text, kind, color);
        effects.show(LogLine::new(text, kind, color));
    }
}
