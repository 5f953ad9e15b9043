// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeout and interval table for the supervisor.

use std::time::Duration;

/// Scheduler tick interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between steering reviews of one worker.
pub const STEERING_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Agent-end wait for pipeline agents (issuer, speedy, worker, finisher).
pub const PIPELINE_END_WAIT: Duration = Duration::from_secs(15 * 60);

/// Agent-end wait for the issuer probe run by the resume pipeline.
pub const RESUME_PROBE_END_WAIT: Duration = Duration::from_secs(20);

/// Agent-end wait for issuers spawned interactively via the control surface.
pub const SUB_ISSUER_END_WAIT: Duration = Duration::from_secs(3 * 60);

/// Agent-end wait for a steering agent's single turn.
pub const STEERING_END_WAIT: Duration = Duration::from_secs(3 * 60);

/// Agent-end wait for broadcast steering.
pub const BROADCAST_END_WAIT: Duration = Duration::from_secs(60);

/// Agent-end wait for complaint resolvers.
pub const RESOLVER_END_WAIT: Duration = Duration::from_secs(2 * 60);

/// How long a stop sweep waits for one agent to exit after SIGTERM.
pub const STOP_WAIT: Duration = Duration::from_secs(5);

/// Combined shutdown grace before everyone is force-killed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Retry budget for agents that exit without a lifecycle hand-off.
pub const RETRY_BUDGET: u32 = 3;

/// Heartbeat push interval for agent observable state.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
