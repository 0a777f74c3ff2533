/*
[INPUT]:  WebSocket configuration and subscription requests
[OUTPUT]: Real-time trade and candle streams
[POS]:    WebSocket layer - real-time market data
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod subscription;

pub use client::{BitfinexWebSocket, WsConfig};
pub use connection::ConnectionState;
pub use events::ListenerId;
pub use subscription::{SubscriptionHandle, SubscriptionKey, SubscriptionState};

/// Lock a std mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
