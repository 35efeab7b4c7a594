//! End-to-end scenarios. Each file holds one concern.

pub mod harness;

mod hooks;
mod lifecycle;
mod protocol_switch;
mod wiring;
mod zero_height;
