//! bulksend: bulk WhatsApp messaging with live progress.
//!
//! Walks an imported contact list, delivers each row's message to the first
//! working phone number, paces sends to stay under channel limits, and lets an
//! operator pause, resume, or cancel the run while it is in flight.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod import;
pub mod logging;

pub mod messaging;
pub mod whatsapp;
