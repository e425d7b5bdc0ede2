//! Scenario tests for the delivery path.
//!
//! - `harness.rs`   - Scripted transport, recording notifier, failing spool
//! - `client.rs`    - Retry loop, backoff and `Retry-After`
//! - `send.rs`      - Immediate delivery, duplicates, rejection, spooling
//! - `resend.rs`    - Spool redelivery, retry ceiling, dead-letter
//! - `transport.rs` - Reqwest transport against a local listener

mod client;
pub(crate) mod harness;
