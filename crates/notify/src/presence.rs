//! Presence rooms: who is viewing what.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use fishdock_core::ParticipantId;

use crate::bus::TopicBus;
use crate::event::{Notification, PresenceAction, PresenceEvent};
use crate::topic::Topic;

/// Joins and leaves derived from one synchronization snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceDiff {
    pub joined: Vec<ParticipantId>,
    pub left: Vec<ParticipantId>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Per-room participant sets, synchronized by snapshot.
///
/// Clients periodically report the full set of participants they observe;
/// join/leave events are the set difference between successive snapshots and
/// are published as discrete events on the room's presence topic.
#[derive(Debug)]
pub struct PresenceRegistry {
    bus: Arc<TopicBus>,
    rooms: RwLock<HashMap<String, HashMap<ParticipantId, JsonValue>>>,
}

impl PresenceRegistry {
    pub fn new(bus: Arc<TopicBus>) -> Self {
        Self {
            bus,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the room's participant set with `snapshot`, publishing one
    /// `Join` per new participant and one `Leave` per vanished one.
    ///
    /// Metadata updates for participants present in both snapshots are
    /// stored but produce no event.
    pub fn sync_room(
        &self,
        room: &str,
        snapshot: HashMap<ParticipantId, JsonValue>,
    ) -> PresenceDiff {
        let mut diff = PresenceDiff::default();
        let mut events = Vec::new();

        {
            let Ok(mut rooms) = self.rooms.write() else {
                return diff;
            };
            let current = rooms.entry(room.to_string()).or_default();

            for (participant_id, metadata) in &snapshot {
                if !current.contains_key(participant_id) {
                    diff.joined.push(*participant_id);
                    events.push((*participant_id, PresenceAction::Join, metadata.clone()));
                }
            }
            for (participant_id, metadata) in current.iter() {
                if !snapshot.contains_key(participant_id) {
                    diff.left.push(*participant_id);
                    events.push((*participant_id, PresenceAction::Leave, metadata.clone()));
                }
            }

            *current = snapshot;
        }

        // Publish outside the registry lock.
        let topic = Topic::presence(room);
        for (participant_id, action, metadata) in events {
            self.bus.publish(
                &topic,
                Notification::Presence(PresenceEvent {
                    event_id: Uuid::now_v7(),
                    room: room.to_string(),
                    participant_id,
                    action,
                    metadata,
                    occurred_at: Utc::now(),
                }),
            );
        }

        diff
    }

    /// Current participant set of a room.
    pub fn participants(&self, room: &str) -> HashMap<ParticipantId, JsonValue> {
        match self.rooms.read() {
            Ok(rooms) => rooms.get(room).cloned().unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    /// Drop a room entirely, publishing a leave for every participant.
    pub fn close_room(&self, room: &str) -> PresenceDiff {
        self.sync_room(room, HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(participants: &[ParticipantId]) -> HashMap<ParticipantId, JsonValue> {
        participants
            .iter()
            .map(|p| (*p, serde_json::json!({"view": "dashboard"})))
            .collect()
    }

    #[test]
    fn first_snapshot_is_all_joins() {
        let bus = Arc::new(TopicBus::new());
        let registry = PresenceRegistry::new(bus);
        let (a, b) = (ParticipantId::new(), ParticipantId::new());

        let diff = registry.sync_room("sales-floor", snapshot(&[a, b]));
        assert_eq!(diff.joined.len(), 2);
        assert!(diff.left.is_empty());
        assert_eq!(registry.participants("sales-floor").len(), 2);
    }

    #[test]
    fn successive_snapshots_diff_into_join_and_leave() {
        let bus = Arc::new(TopicBus::new());
        let registry = PresenceRegistry::new(bus.clone());
        let sub = bus.subscribe(Topic::presence("sales-floor"));
        let (a, b, c) = (ParticipantId::new(), ParticipantId::new(), ParticipantId::new());

        registry.sync_room("sales-floor", snapshot(&[a, b]));
        let diff = registry.sync_room("sales-floor", snapshot(&[b, c]));

        assert_eq!(diff.joined, vec![c]);
        assert_eq!(diff.left, vec![a]);

        let mut joins = 0;
        let mut leaves = 0;
        while let Ok(Notification::Presence(event)) = sub.try_recv() {
            match event.action {
                PresenceAction::Join => joins += 1,
                PresenceAction::Leave => leaves += 1,
            }
        }
        assert_eq!((joins, leaves), (3, 1));
    }

    #[test]
    fn unchanged_snapshot_is_quiet() {
        let bus = Arc::new(TopicBus::new());
        let registry = PresenceRegistry::new(bus.clone());
        let sub = bus.subscribe(Topic::presence("r"));
        let a = ParticipantId::new();

        registry.sync_room("r", snapshot(&[a]));
        let _ = sub.try_recv();
        let diff = registry.sync_room("r", snapshot(&[a]));

        assert!(diff.is_empty());
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn close_room_publishes_leaves() {
        let bus = Arc::new(TopicBus::new());
        let registry = PresenceRegistry::new(bus);
        let a = ParticipantId::new();

        registry.sync_room("r", snapshot(&[a]));
        let diff = registry.close_room("r");

        assert_eq!(diff.left, vec![a]);
        assert!(registry.participants("r").is_empty());
    }
}
