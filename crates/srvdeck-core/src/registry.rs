use crate::color::Hsla;
use crate::protocol::{InstanceRecord, LineKind, LogLine};
use crate::tabs::TabHandle;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

pub type Page = Vec<LogLine>;

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub hue: u8,
    pub attributes: Map<String, Value>,
    pub log: Vec<LogLine>,
    pub pages: BTreeMap<u32, Page>,
    pub tab: Option<TabHandle>,
}

impl Instance {
    fn from_record(record: InstanceRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            hue: record.hue,
            attributes: record.attributes,
            log: Vec::new(),
            pages: BTreeMap::new(),
            tab: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerListOutcome {
    pub created: Vec<String>,
    pub auto_selected: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageUpdate {
    UnknownInstance,
    Stored { selected: bool },
}

/// Client-side model of every instance the server has announced.
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: HashMap<String, Instance>,
    order: Vec<String>,
    selected: Option<String>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a full instance list. Known ids keep their log, pages and tab.
    /// Instances missing from `list` are kept.
    pub fn apply_server_list(&mut self, list: Vec<InstanceRecord>) -> ServerListOutcome {
        let mut outcome = ServerListOutcome::default();
        let first_listed = list.first().map(|record| record.id.clone());
        for record in list {
            match self.instances.get_mut(&record.id) {
                Some(existing) => {
                    existing.name = record.name;
                    existing.hue = record.hue;
                    existing.attributes = record.attributes;
                }
                None => {
                    let id = record.id.clone();
                    self.instances
                        .insert(id.clone(), Instance::from_record(record));
                    self.order.push(id.clone());
                    outcome.created.push(id);
                }
            }
        }
        if self.selected.is_none() {
            if let Some(first) = first_listed {
                self.selected = Some(first.clone());
                outcome.auto_selected = Some(first);
            }
        }
        outcome
    }

    pub fn apply_server_log(
        &mut self,
        instance_id: &str,
        page_no: u32,
        messages: Vec<LogLine>,
    ) -> PageUpdate {
        let Some(instance) = self.instances.get_mut(instance_id) else {
            return PageUpdate::UnknownInstance;
        };
        instance.pages.insert(page_no, messages);
        PageUpdate::Stored {
            selected: self.selected.as_deref() == Some(instance_id),
        }
    }

    /// Returns how many instance logs received the line.
    pub fn append_local(&mut self, text: &str, kind: LineKind, color: Option<Hsla>) -> usize {
        let line = LogLine::new(text, kind, color);
        if kind == LineKind::Meta {
            for instance in self.instances.values_mut() {
                instance.log.push(line.clone());
            }
            return self.instances.len();
        }
        let Some(selected) = self.selected.as_deref() else {
            return 0;
        };
        match self.instances.get_mut(selected) {
            Some(instance) => {
                instance.log.push(line);
                1
            }
            None => 0,
        }
    }

    /// Full transcript of an instance: its pages concatenated by page number.
    pub fn rebuild_transcript(&self, instance_id: &str) -> Option<Vec<LogLine>> {
        let instance = self.instances.get(instance_id)?;
        Some(instance.pages.values().flatten().cloned().collect())
    }

    pub fn select(&mut self, instance_id: &str) -> bool {
        if !self.instances.contains_key(instance_id) {
            return false;
        }
        self.selected = Some(instance_id.to_string());
        true
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_instance(&self) -> Option<&Instance> {
        self.selected
            .as_deref()
            .and_then(|id| self.instances.get(id))
    }

    pub fn get(&self, instance_id: &str) -> Option<&Instance> {
        self.instances.get(instance_id)
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.instances.contains_key(instance_id)
    }

    /// Instances in the order they were first announced.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.order.iter().filter_map(|id| self.instances.get(id))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Records the tab created for an instance. A tab is attached once.
    pub fn attach_tab(&mut self, instance_id: &str, handle: TabHandle) -> bool {
        match self.instances.get_mut(instance_id) {
            Some(instance) if instance.tab.is_none() => {
                instance.tab = Some(handle);
                true
            }
            _ => false,
        }
    }
}
