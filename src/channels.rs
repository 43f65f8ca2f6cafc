use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, broadcast};

const GROUP_CAPACITY: usize = 64;

/// Named broadcast groups shared by every socket of the process.
///
/// Frames are pre-serialised JSON strings. Delivery is best effort: a subscriber
/// that falls more than `GROUP_CAPACITY` frames behind loses the oldest ones.
#[derive(Clone, Default)]
pub struct ChannelLayer {
    groups: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

pub fn chat_group(room_id: i64) -> String {
    format!("chat_{room_id}")
}

pub fn user_group(user_id: i64) -> String {
    format!("user_{user_id}")
}

impl ChannelLayer {
    pub async fn group_add(&self, group: &str) -> broadcast::Receiver<String> {
        let mut groups = self.groups.lock().await;
        groups
            .entry(group.to_owned())
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    /// Returns how many subscribers the frame was handed to.
    pub async fn group_send(&self, group: &str, frame: String) -> usize {
        let groups = self.groups.lock().await;
        match groups.get(group) {
            Some(tx) => tx.send(frame).unwrap_or(0),
            None => 0,
        }
    }

    /// Drops the group once its last subscriber is gone.
    pub async fn group_discard(&self, group: &str) {
        let mut groups = self.groups.lock().await;
        if groups.get(group).is_some_and(|tx| tx.receiver_count() == 0) {
            groups.remove(group);
        }
    }

    pub async fn group_size(&self, group: &str) -> usize {
        self.groups
            .lock()
            .await
            .get(group)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
