//! Client entry points for publishing into and reading from an exchange.
//!
//! The synchronous `get_*` functions query the socket's bound exchange
//! directly, for protocol-internal callers. [`publish`] and [`receive`] go
//! through the async operation path and await its completion.

use crate::aio::{AsyncOp, RecvQuery};
use crate::error::ClientError;
use crate::packet::{PublishPacket, QoS};
use crate::socket::ExchangeSocket;
use bytes::Bytes;
use exchange_rs::{ExchangeError, ExchangeStore, Message};
use std::sync::Arc;

fn bound_exchange(socket: &ExchangeSocket) -> Result<Arc<ExchangeStore>, ClientError> {
    socket
        .exchange()
        .ok_or(ClientError::Exchange(ExchangeError::NotBound))
}

/// Publishes `payload` on `topic` tagged with `key`.
///
/// Returns the messages the full ring buffers evicted to make room; they
/// belong to the caller now. Messages that fit are retained solely in the
/// store and nothing comes back.
pub async fn publish(
    socket: &ExchangeSocket,
    topic: &str,
    key: u64,
    payload: impl Into<Bytes>,
    qos: QoS,
) -> Result<Vec<Message>, ClientError> {
    let packet = PublishPacket::new(topic, payload).with_qos(qos).with_key(key);
    let op = AsyncOp::new();
    socket.send_aio(&op, packet)?;
    op.wait().await.into_messages()
}

/// Receives `count` contiguous messages ending at `key` through the async
/// operation path.
pub async fn receive(
    socket: &ExchangeSocket,
    key: u64,
    count: usize,
) -> Result<Vec<Message>, ClientError> {
    receive_query(socket, RecvQuery::Window { key, count }).await
}

/// Receives the result of an arbitrary query through the async operation
/// path.
pub async fn receive_query(
    socket: &ExchangeSocket,
    query: RecvQuery,
) -> Result<Vec<Message>, ClientError> {
    let op = AsyncOp::new();
    socket.recv_aio(&op, query)?;
    op.wait().await.into_messages()
}

/// The message stored under `key`.
pub fn get_msg_by_key(socket: &ExchangeSocket, key: u64) -> Result<Message, ClientError> {
    Ok(bound_exchange(socket)?.lookup_by_key(key)?)
}

/// Exactly `count` contiguous messages ending at `key`, or an error with no
/// partial list.
pub fn get_msgs_by_key(
    socket: &ExchangeSocket,
    key: u64,
    count: usize,
) -> Result<Vec<Message>, ClientError> {
    Ok(bound_exchange(socket)?.lookup_n_by_key(key, count)?)
}

/// Up to `count` messages from the smallest key `>= approx_key`; the result
/// length is the match count.
pub fn get_msgs_fuzz(
    socket: &ExchangeSocket,
    approx_key: u64,
    count: usize,
) -> Result<Vec<Message>, ClientError> {
    Ok(bound_exchange(socket)?.lookup_fuzzy(approx_key, count)?)
}
