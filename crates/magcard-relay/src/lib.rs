//! Ring-bus conversion-board emulation.
//!
//! Some cabinets wire the reader through a multi-drop serial ring rather
//! than a point-to-point line. A conversion board sits on the ring and
//! relays bytes to the reader using a 2-byte polling micro-protocol. This
//! crate emulates that board: [`RelayBoard`] services the ring side, a pair
//! of fixed-capacity [`RingQueue`]s carries bytes between it and the packet
//! layer, and [`QueuePort`] makes the queue pair look like an ordinary
//! duplex byte channel to the packet engine.
//!
//! Each queue has exactly one producer and one consumer: the board fills
//! the inbound queue and drains the outbound queue, the packet engine does
//! the reverse, and nothing else touches them.

pub mod board;
pub mod port;
pub mod queue;

pub use board::RelayBoard;
pub use port::QueuePort;
pub use queue::{RelayQueues, RingQueue};
