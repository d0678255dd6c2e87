/// Opaque reference to an instance's tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabHandle(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub instance_id: String,
    pub label: String,
    pub active: bool,
}

/// State the instance tab row has to reflect.
#[derive(Debug, Clone, Default)]
pub struct TabStrip {
    tabs: Vec<Tab>,
}

impl TabStrip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, instance_id: &str, label: &str, active: bool) -> TabHandle {
        if active {
            self.clear_active();
        }
        self.tabs.push(Tab {
            instance_id: instance_id.to_string(),
            label: label.to_string(),
            active,
        });
        TabHandle(self.tabs.len() - 1)
    }

    pub fn relabel(&mut self, handle: TabHandle, label: &str) -> bool {
        match self.tabs.get_mut(handle.0) {
            Some(tab) if tab.label != label => {
                tab.label = label.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn activate(&mut self, handle: TabHandle) {
        if handle.0 >= self.tabs.len() {
            return;
        }
        self.clear_active();
        self.tabs[handle.0].active = true;
    }

    pub fn get(&self, handle: TabHandle) -> Option<&Tab> {
        self.tabs.get(handle.0)
    }

    pub fn active(&self) -> Option<TabHandle> {
        self.tabs.iter().position(|tab| tab.active).map(TabHandle)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    fn clear_active(&mut self) {
        for tab in &mut self.tabs {
            tab.active = false;
        }
    }
}
