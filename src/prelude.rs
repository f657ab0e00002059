//! Convenient re-exports for common usage.
//!
//! ```rust
//! use whack_sync::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Session types**: [`WhackSession`], [`SessionBuilder`], [`Role`], [`SessionStatus`]
//! - **Configuration**: [`ScheduleConfig`], [`BoardConfig`], [`ProtocolConfig`],
//!   [`BackoffPolicy`], [`ExpiryPolicy`]
//! - **Events and rendering**: [`WhackEvent`], [`RetireReason`], [`TapOutcome`],
//!   [`RenderSink`], [`EventDispatcher`]
//! - **Board types**: [`SlotIndex`], [`TargetId`], [`Pose`]
//! - **Transport**: [`Transport`], [`TransportEvent`], [`Destination`], [`MemoryNetwork`],
//!   [`UdpTransport`]
//! - **Time**: [`Clock`], [`SimTime`], [`ManualClock`], [`SystemClock`]
//! - **Error handling**: [`WhackError`], [`WhackResult`]

// Core session types
pub use crate::{Role, SessionBuilder, SessionStatus, WhackSession};

// Configuration
pub use crate::{BackoffPolicy, BoardConfig, ExpiryPolicy, ProtocolConfig, ScheduleConfig};

// Events and rendering
pub use crate::{EventDispatcher, RenderSink, RetireReason, TapOutcome, WhackEvent};

// Board types
pub use crate::{Pose, SlotIndex, TargetId};

// Transports
pub use crate::{Destination, MemoryNetwork, Transport, TransportEvent, UdpTransport};

// Time
pub use crate::{Clock, ManualClock, SimTime, SystemClock};

// Error handling
pub use crate::{WhackError, WhackResult};
