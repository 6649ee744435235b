//! The `transport` module exposes the broker over HTTP.
//!
//! It defines the JSON wire models, the publish/list routes, the websocket
//! subscribe endpoint and the server bootstrap. Routing, request decoding and
//! websocket framing all live here so the broker engine stays transport-free.

pub mod http;
pub mod message;
pub mod server;
pub mod websocket;
