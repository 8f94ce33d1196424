//! HTTP/1.x wire layer.
//!
//! The gateway speaks HTTP/1.x on both sides and never decodes message
//! bodies: heads are parsed and re-serialized, bodies are copied verbatim.
//!
//! # Architecture
//!
//! - **`connection`**: The per-client connection loop
//! - **`parser`**: Parses request and response heads from byte buffers
//! - **`headers`**: Ordered, case-preserving header list
//! - **`body`**: Body framing and verbatim body relaying
//! - **`request`**: Request head representation
//! - **`response`**: Locally generated responses and relayed response heads
//! - **`writer`**: Serializes heads and responses
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for the next request head
//!        └──────┬──────┘
//!               │ Head parsed
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Auth, resolve, relay (streams body + response)
//!        └──────┬───────────┘
//!               │ Response relayed
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod body;
pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
