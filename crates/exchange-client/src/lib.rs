//! Async Operation Bridge and Socket Facade for exchange-rs
//!
//! Connects an [`exchange_rs::ExchangeStore`] to socket users: publishes are
//! admitted through send operations that hand evicted messages back, and
//! receives run store queries through operation objects completed with a
//! callback and an awaitable signal.
//!
//! # Features
//!
//! - **Typed operations**: each completion carries exactly the fields its
//!   operation kind produces, no untyped side channel
//! - **Exactly-once completion**: one post runs one store query and fires
//!   the callback once
//! - **Best-effort cancellation**: a query that has not started never runs
//! - **Ownership hand-off**: evicted messages are returned, never dropped
//!
//! # Example
//!
//! ```ignore
//! use exchange_client::{publish, receive, ExchangeSocket, QoS};
//! use exchange_rs::exchange_init;
//!
//! #[tokio::main]
//! async fn main() {
//!     let exchange = exchange_init("exchange1", "topic1", 10, &["ringBuffer1"]).unwrap();
//!     let socket = ExchangeSocket::open().unwrap();
//!     socket.bind(exchange).unwrap();
//!
//!     for key in 0..10 {
//!         publish(&socket, "topic1", key, Vec::new(), QoS::AtMostOnce).await.unwrap();
//!     }
//!
//!     let window = receive(&socket, 9, 10).await.unwrap();
//!     assert_eq!(window.len(), 10);
//! }
//! ```

mod aio;
mod client;
mod error;
mod packet;
mod socket;

pub use aio::{AsyncOp, Callback, OpCompletion, OpOutput, RecvQuery};
pub use client::{
    get_msg_by_key, get_msgs_by_key, get_msgs_fuzz, publish, receive, receive_query,
};
pub use error::ClientError;
pub use packet::{PublishPacket, QoS, CMD_PUBLISH};
pub use socket::{ExchangeSocket, SocketOption};
