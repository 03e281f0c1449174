//! Message bus between the control panel, the coordinator and the agents
//!
//! ```text
//! panel ──GET_STATUS / TOGGLE_GESTURE──► coordinator ──► agent (active page)
//!   ▲                                        │
//!   └──────────── reply or rest state ◄──────┘
//! ```
//!
//! Every request gets exactly one reply. A missing agent or a missing reply
//! is not an error: the panel simply sees the rest state.

pub mod coordinator;
pub mod ipc;
pub mod protocol;

pub use coordinator::Coordinator;
pub use protocol::{BusError, BusRequest, BusResponse, StatusReport, ToggleReport};
