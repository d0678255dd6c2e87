use crate::protocol::Identity;
use crate::session::ChannelStatus;
use serde_json::{Map, Value};

/// Fields consumed by the stats panel. `fields` is whatever the server has
/// sent through `Status`, merged key by key.
#[derive(Debug, Clone, Default)]
pub struct StatsModel {
    pub channel: ChannelStatus,
    pub identity: Option<Identity>,
    fields: Map<String, Value>,
}

impl StatsModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow merge: top-level keys in `partial` replace existing ones.
    pub fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.fields.insert(key, value);
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn self_hue(&self) -> Option<u8> {
        self.identity.as_ref().map(|identity| identity.hue)
    }

    /// Looks up a participant's hue in the `clients` field. Accepts a map keyed
    /// by participant id or a list of client records carrying `uuid` or `id`.
    pub fn client_hue(&self, participant_id: &str) -> Option<u8> {
        let client = match self.fields.get("clients")? {
            Value::Object(map) => map.get(participant_id)?,
            Value::Array(items) => items.iter().find(|item| {
                ["uuid", "id"].iter().any(|key| {
                    item.get(*key).and_then(Value::as_str) == Some(participant_id)
                })
            })?,
            _ => return None,
        };
        let hue = client.get("hue")?.as_u64()?;
        u8::try_from(hue).ok()
    }

    /// Display rows for the stats panel, in a stable order.
    pub fn rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![("websocket".to_string(), self.channel.as_str().to_string())];
        if let Some(identity) = &self.identity {
            rows.push(("hue".to_string(), identity.hue.to_string()));
            if let Some(name) = &identity.name {
                rows.push(("name".to_string(), name.clone()));
            }
        }
        let mut keys: Vec<&String> = self.fields.keys().collect();
        keys.sort();
        for key in keys {
            let value = &self.fields[key.as_str()];
            rows.push((key.clone(), summarize(value)));
        }
        rows
    }
}

fn summarize(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => format!("[{}]", items.len()),
        Value::Object(map) => format!("{{{}}}", map.len()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn merge_replaces_top_level_keys_only() {
        let mut stats = StatsModel::new();
        stats.merge(object(json!({"name": "Alpha", "settings": {"rate": 1}})));
        stats.merge(object(json!({"settings": {"tick": 64}, "communicator": "CONNECTED"})));

        assert_eq!(stats.field("name"), Some(&json!("Alpha")));
        assert_eq!(stats.field("settings"), Some(&json!({"tick": 64})));
        assert_eq!(stats.field("communicator"), Some(&json!("CONNECTED")));
    }

    #[test]
    fn client_hue_reads_map_and_list_shapes() {
        let mut stats = StatsModel::new();
        stats.merge(object(json!({"clients": {"p1": {"hue": 40}, "p2": {"hue": 999}}})));
        assert_eq!(stats.client_hue("p1"), Some(40));
        assert_eq!(stats.client_hue("p2"), None);
        assert_eq!(stats.client_hue("p3"), None);

        stats.merge(object(json!({"clients": [{"uuid": "p4", "hue": 7}, {"id": "p5", "hue": 8}]})));
        assert_eq!(stats.client_hue("p4"), Some(7));
        assert_eq!(stats.client_hue("p5"), Some(8));
        assert_eq!(stats.client_hue("p1"), None);
    }

    #[test]
    fn rows_start_with_channel_status() {
        let mut stats = StatsModel::new();
        stats.merge(object(json!({"clients": [1, 2], "name": "Alpha", "uptime": 12})));
        let rows = stats.rows();
        assert_eq!(rows[0], ("websocket".to_string(), "CONNECTING".to_string()));
        assert_eq!(rows[1], ("clients".to_string(), "[2]".to_string()));
        assert_eq!(rows[2], ("name".to_string(), "Alpha".to_string()));
        assert_eq!(rows[3], ("uptime".to_string(), "12".to_string()));
    }
}
