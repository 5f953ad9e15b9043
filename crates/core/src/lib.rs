// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oms-core: Core library for the OMS singularity supervisor

pub mod agent;
pub mod clock;
pub mod complaint;
pub mod control;
pub mod id;
pub mod lifecycle;
pub mod rpc;
pub mod task;
pub mod time_fmt;

pub use agent::{AgentEvent, AgentStatus, AgentType, AgentUsage, ThinkingLevel};
pub use clock::{Clock, FakeClock, SystemClock};
pub use complaint::{Complaint, ComplaintId, ComplaintStatus};
pub use control::ControlMessage;
pub use id::{IdGen, SequentialIdGen, ShortId, UuidIdGen};
pub use lifecycle::{
    allowed_actions, allowed_targets, LifecycleAction, LifecycleInput, LifecycleRecord,
    LifecycleRejection,
};
pub use rpc::{
    extract_session_id, AgentMessage, AssistantMessageEvent, InboundFrame, RpcCommand, RpcEvent,
    RpcRequest, RpcResponse, ToolCallSummary, UsageCounters,
};
pub use task::{TaskRef, TaskScope, TaskStatus};
pub use time_fmt::{format_elapsed, format_utc, now_epoch_ms};

pub use agent::AgentId;
pub use agent::SessionId;
pub use agent::StoreAgentId;
pub use task::TaskId;
