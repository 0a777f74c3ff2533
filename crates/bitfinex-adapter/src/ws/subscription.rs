/*
[INPUT]:  Subscribe/unsubscribe requests and exchange acks
[OUTPUT]: Logical-key <-> channel-id mapping with lifecycle state
[POS]:    WebSocket layer - subscription registry (single shared state)
[UPDATE]: When the subscription lifecycle or ack matching changes
*/

use std::collections::HashMap;
use std::fmt;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{BitfinexError, Result};
use crate::types::{ChannelKind, Timeframe};

/// Client-side identifier of a desired stream, stable across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub kind: ChannelKind,
    pub pair: String,
    pub timeframe: Option<Timeframe>,
}

impl SubscriptionKey {
    pub fn trades(pair: impl Into<String>) -> Self {
        SubscriptionKey {
            kind: ChannelKind::Trades,
            pair: pair.into(),
            timeframe: None,
        }
    }

    pub fn candles(pair: impl Into<String>, timeframe: Timeframe) -> Self {
        SubscriptionKey {
            kind: ChannelKind::Candles,
            pair: pair.into(),
            timeframe: Some(timeframe),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timeframe {
            Some(tf) => write!(f, "{}:{}:{}", self.kind.as_str(), tf.token(), self.pair),
            None => write!(f, "{}:{}", self.kind.as_str(), self.pair),
        }
    }
}

/// Lifecycle of one subscription on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe frame sent, awaiting the exchange ack.
    Requested,
    /// Ack received, channel id bound; data frames flow.
    Active,
    /// Unsubscribe frame sent, awaiting the removal ack.
    Unsubscribing,
    /// The exchange rejected the request, or it was aborted before sending.
    Failed,
    /// Terminal: removal acked or the connection was torn down.
    Removed,
}

/// Caller-side view of a subscription's lifecycle.
///
/// Subscribe calls return once the frame is sent, not once the exchange
/// acks; await [`SubscriptionHandle::wait_active`] for end-to-end
/// confirmation.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    key: SubscriptionKey,
    state_rx: watch::Receiver<SubscriptionState>,
}

impl SubscriptionHandle {
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Latest observed lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        *self.state_rx.borrow()
    }

    /// Wait until the exchange acks the subscription.
    ///
    /// Errors with [`BitfinexError::SubscriptionFailed`] if the subscription
    /// is rejected or evicted (e.g. the connection drops) before activating.
    pub async fn wait_active(&mut self) -> Result<()> {
        loop {
            match *self.state_rx.borrow_and_update() {
                SubscriptionState::Active => return Ok(()),
                SubscriptionState::Failed | SubscriptionState::Removed => {
                    return Err(BitfinexError::SubscriptionFailed {
                        key: self.key.clone(),
                    });
                }
                SubscriptionState::Requested | SubscriptionState::Unsubscribing => {}
            }
            if self.state_rx.changed().await.is_err() {
                // Sender dropped without a terminal notification.
                return Err(BitfinexError::SubscriptionFailed {
                    key: self.key.clone(),
                });
            }
        }
    }
}

#[derive(Debug)]
struct Subscription {
    channel_id: Option<u32>,
    state: SubscriptionState,
    state_tx: watch::Sender<SubscriptionState>,
}

impl Subscription {
    fn notify(&self, state: SubscriptionState) {
        let _ = self.state_tx.send(state);
    }
}

/// Owns every subscription on the current connection and the bidirectional
/// key <-> channel-id mapping.
///
/// Channel ids are exchange-assigned and reused across subscriptions over a
/// connection's lifetime; the registry only records and releases its local
/// binding. All operations are atomic with respect to each other: the owner
/// serializes access behind a single mutex and none of these methods is
/// decomposable from outside.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, Subscription>,
    by_channel: HashMap<u32, SubscriptionKey>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `Requested` entry for the key.
    ///
    /// Fails with [`BitfinexError::DuplicateSubscription`] while any entry
    /// for the key is live (`Requested`, `Active`, or still
    /// `Unsubscribing`).
    pub fn request_subscribe(&mut self, key: SubscriptionKey) -> Result<SubscriptionHandle> {
        if self.entries.contains_key(&key) {
            return Err(BitfinexError::DuplicateSubscription { key });
        }
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Requested);
        self.entries.insert(
            key.clone(),
            Subscription {
                channel_id: None,
                state: SubscriptionState::Requested,
                state_tx,
            },
        );
        Ok(SubscriptionHandle { key, state_rx })
    }

    /// Roll back a `Requested` entry whose subscribe frame was never sent.
    pub fn abort_request(&mut self, key: &SubscriptionKey) {
        let requested = matches!(
            self.entries.get(key).map(|sub| sub.state),
            Some(SubscriptionState::Requested)
        );
        if requested {
            if let Some(sub) = self.entries.remove(key) {
                sub.notify(SubscriptionState::Failed);
            }
        }
    }

    /// Bind `chan_id` to the matching `Requested` entry and activate it.
    ///
    /// A no-op (logged) when no matching request exists: the exchange may
    /// echo acks for requests already superseded by a fast unsubscribe. An
    /// ack for a channel id still bound to a live entry is refused, since
    /// honoring it would break the one-id-one-subscription invariant.
    pub fn confirm_subscribe(&mut self, chan_id: u32, key: &SubscriptionKey) {
        if let Some(bound) = self.by_channel.get(&chan_id) {
            warn!(chan_id, key = %key, bound = %bound, "subscribe ack for a channel id already in use; ignoring");
            return;
        }
        match self.entries.get_mut(key) {
            Some(sub) if sub.state == SubscriptionState::Requested => {
                sub.state = SubscriptionState::Active;
                sub.channel_id = Some(chan_id);
                sub.notify(SubscriptionState::Active);
                self.by_channel.insert(chan_id, key.clone());
                debug!(chan_id, key = %key, "subscription active");
            }
            Some(sub) => {
                debug!(chan_id, key = %key, state = ?sub.state, "subscribe ack for non-pending entry; ignoring");
            }
            None => {
                debug!(chan_id, key = %key, "subscribe ack with no matching request; ignoring");
            }
        }
    }

    /// Evict a `Requested` entry rejected by the exchange.
    pub fn fail_subscribe(&mut self, key: &SubscriptionKey) {
        let requested = matches!(
            self.entries.get(key).map(|sub| sub.state),
            Some(SubscriptionState::Requested)
        );
        if requested {
            if let Some(sub) = self.entries.remove(key) {
                sub.notify(SubscriptionState::Failed);
                debug!(key = %key, "subscription failed");
            }
        }
    }

    /// Transition an `Active` entry to `Unsubscribing` and return the bound
    /// channel id for the outbound unsubscribe frame.
    pub fn request_unsubscribe(&mut self, key: &SubscriptionKey) -> Result<u32> {
        match self.entries.get_mut(key) {
            Some(sub) if sub.state == SubscriptionState::Active => match sub.channel_id {
                Some(chan_id) => {
                    sub.state = SubscriptionState::Unsubscribing;
                    sub.notify(SubscriptionState::Unsubscribing);
                    Ok(chan_id)
                }
                None => Err(BitfinexError::NotSubscribed { key: key.clone() }),
            },
            _ => Err(BitfinexError::NotSubscribed { key: key.clone() }),
        }
    }

    /// Remove the entry bound to `chan_id`, releasing the id for reuse.
    pub fn confirm_unsubscribe(&mut self, chan_id: u32) {
        match self.by_channel.remove(&chan_id) {
            Some(key) => {
                if let Some(sub) = self.entries.remove(&key) {
                    sub.notify(SubscriptionState::Removed);
                }
                debug!(chan_id, key = %key, "subscription removed");
            }
            None => {
                debug!(chan_id, "unsubscribe ack for unknown channel id; ignoring");
            }
        }
    }

    /// Resolve a channel id for dispatch.
    ///
    /// Returns the key only while the subscription is `Active`; data frames
    /// for ids in any other state must be dropped by the caller.
    pub fn resolve(&self, chan_id: u32) -> Option<SubscriptionKey> {
        let key = self.by_channel.get(&chan_id)?;
        match self.entries.get(key).map(|sub| sub.state) {
            Some(SubscriptionState::Active) => Some(key.clone()),
            _ => None,
        }
    }

    /// Current lifecycle state for a key, if an entry exists.
    pub fn state_of(&self, key: &SubscriptionKey) -> Option<SubscriptionState> {
        self.entries.get(key).map(|sub| sub.state)
    }

    /// Drop all entries; invoked on disconnect. Subscriptions are
    /// connection-scoped and must be explicitly re-requested.
    pub fn clear(&mut self) {
        for (_, sub) in self.entries.drain() {
            sub.notify(SubscriptionState::Removed);
        }
        self.by_channel.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
