//! Order intake and reconciliation pipeline.
//!
//! A create-order request passes the idempotency gate, is persisted in
//! PROCESSING, and a created event is handed to the broker. Workers consume
//! that event and forward it to the downstream fulfillment service; a second
//! stream reports the downstream outcome and moves the order to CONFIRMED or
//! FAILED through a guarded compare-and-swap, so duplicate and out-of-order
//! deliveries are harmless.
//!
//! The serving layer (HTTP, auth, payload decryption) embeds this crate and
//! calls [`intake::CreateOrder`]; the `order-relay` binary runs the consumer
//! side.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod idempotency;
pub mod intake;
pub mod messaging;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
