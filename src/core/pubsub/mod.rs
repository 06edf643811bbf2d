// src/core/pubsub/mod.rs

//! The publish-subscribe hub: channel -> subscriber fanout guarded by a
//! channel-striped locker. Subscribers are reached through their connection
//! outboxes, so a publish never blocks on a slow client socket.

use crate::connection::session::Session;
use crate::core::locking::KeyLocker;
use crate::core::protocol::RespFrame;
use crate::core::storage::ShardedDict;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

/// Shards for the channel registry.
const SUBS_DICT_SHARDS: usize = 1 << 8;
/// Slots in the channel-striped locker.
const SUBS_LOCKER_SIZE: usize = 256;

#[derive(Debug, Clone)]
struct Subscriber {
    session_id: u64,
    outbox: UnboundedSender<RespFrame>,
}

#[derive(Debug)]
pub struct Hub {
    subs: ShardedDict<Vec<Subscriber>>,
    locker: KeyLocker,
}

fn push_message(kind: &'static str, channel: &Bytes, count: i64) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString(Bytes::from_static(kind.as_bytes())),
        RespFrame::BulkString(channel.clone()),
        RespFrame::Integer(count),
    ])
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            subs: ShardedDict::with_shard_count(SUBS_DICT_SHARDS),
            locker: KeyLocker::new(SUBS_LOCKER_SIZE),
        }
    }

    /// Subscribes the session to each channel, confirming every one with a
    /// `["subscribe", channel, total]` push.
    pub async fn subscribe(&self, session: &mut Session, channels: &[Bytes]) {
        let Some(outbox) = session.outbox.clone() else {
            return;
        };
        let _guard = self.locker.lock_exclusive(channels).await;
        for channel in channels {
            let session_id = session.id;
            let (added, _) = self.subs.with_value_or_insert_mut(
                channel.clone(),
                Vec::new,
                |subscribers| {
                    if subscribers.iter().any(|s| s.session_id == session_id) {
                        false
                    } else {
                        subscribers.push(Subscriber {
                            session_id,
                            outbox: outbox.clone(),
                        });
                        true
                    }
                },
            );
            session.subscribed.insert(channel.clone());
            if added {
                session.push_frame(push_message(
                    "subscribe",
                    channel,
                    session.subscribed.len() as i64,
                ));
            }
        }
    }

    /// Unsubscribes from the given channels, or from everything when none are
    /// given. Every removal is confirmed with an `["unsubscribe", ...]` push.
    pub async fn unsubscribe(&self, session: &mut Session, channels: &[Bytes]) {
        let channels: Vec<Bytes> = if channels.is_empty() {
            session.subscribed.iter().cloned().collect()
        } else {
            channels.to_vec()
        };

        if channels.is_empty() {
            // Nothing to leave: still acknowledge, with a null channel.
            session.push_frame(RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"unsubscribe")),
                RespFrame::Null,
                RespFrame::Integer(0),
            ]));
            return;
        }

        let _guard = self.locker.lock_exclusive(&channels).await;
        for channel in &channels {
            self.remove_subscriber(channel, session.id);
            session.subscribed.remove(channel);
            session.push_frame(push_message(
                "unsubscribe",
                channel,
                session.subscribed.len() as i64,
            ));
        }
    }

    /// Drops the session from every channel it joined, without pushing
    /// confirmations. Called when a connection goes away.
    pub async fn unsubscribe_all(&self, session: &mut Session) {
        let channels: Vec<Bytes> = session.subscribed.drain().collect();
        if channels.is_empty() {
            return;
        }
        let _guard = self.locker.lock_exclusive(&channels).await;
        for channel in &channels {
            self.remove_subscriber(channel, session.id);
        }
    }

    fn remove_subscriber(&self, channel: &Bytes, session_id: u64) {
        let emptied = self
            .subs
            .with_value_mut(channel, |subscribers| {
                subscribers.retain(|s| s.session_id != session_id);
                subscribers.is_empty()
            })
            .unwrap_or(false);
        if emptied {
            self.subs.remove(channel);
        }
    }

    /// Delivers `["message", channel, payload]` to every subscriber of the
    /// channel. Returns the number of subscribers notified.
    pub async fn publish(&self, channel: &Bytes, payload: &Bytes) -> usize {
        let channels = [channel.clone()];
        let _guard = self.locker.lock_exclusive(&channels).await;
        let Some(subscribers) = self.subs.get(channel) else {
            return 0;
        };

        let frame = RespFrame::Array(vec![
            RespFrame::BulkString(Bytes::from_static(b"message")),
            RespFrame::BulkString(channel.clone()),
            RespFrame::BulkString(payload.clone()),
        ]);

        let mut delivered = 0;
        let mut dead = Vec::new();
        for subscriber in &subscribers {
            if subscriber.outbox.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(subscriber.session_id);
            }
        }

        // Subscribers whose connection vanished without a clean unsubscribe
        // are pruned on the way out.
        for session_id in dead {
            self.remove_subscriber(channel, session_id);
        }
        delivered
    }

    /// The number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &Bytes) -> usize {
        self.subs.with_value(channel, Vec::len).unwrap_or(0)
    }
}
