/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Bitfinex adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod error;
pub mod http;
pub mod types;
pub mod ws;

// Re-export commonly used types from error
pub use error::{BitfinexError, Result};

// Re-export commonly used types from http
pub use http::{BitfinexClient, ClientConfig};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    BitfinexWebSocket,
    ConnectionState,
    ListenerId,
    SubscriptionHandle,
    SubscriptionKey,
    SubscriptionState,
    WsConfig,
};
