// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Update commands and their delivery lifecycle.

use std::fmt;

use tokio::time::Instant;

use crate::error::DeliveryError;
use crate::types::{Kelvin, LightId};

/// Where a command is in its delivery lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandState {
    /// Waiting in the queue for the worker.
    Pending,
    /// Failed transiently; parked until `until` before rejoining the queue.
    AwaitingBackoff {
        /// When the command becomes eligible for re-insertion.
        until: Instant,
    },
    /// Removed from the queue without being delivered.
    Dropped(DropReason),
}

/// Why a command was removed without being delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Transient failures persisted past the retry limit.
    RetriesExhausted {
        /// Number of delivery attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: DeliveryError,
    },
    /// The gateway returned an error that retrying cannot fix.
    Permanent(DeliveryError),
    /// A newer command for the same light replaced this one.
    Superseded,
    /// The delivery was cancelled before the gateway answered.
    Cancelled,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {attempts} attempts: {last_error}"),
            Self::Permanent(error) => write!(f, "permanent failure: {error}"),
            Self::Superseded => f.write_str("superseded by a newer update"),
            Self::Cancelled => f.write_str("cancelled while in flight"),
        }
    }
}

/// A color temperature update for one light.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    light_id: LightId,
    target: Kelvin,
    retry_count: u32,
    last_error: Option<DeliveryError>,
    state: CommandState,
}

impl UpdateCommand {
    /// Creates a pending command that has never been attempted.
    #[must_use]
    pub fn new(light_id: LightId, target: Kelvin) -> Self {
        Self {
            light_id,
            target,
            retry_count: 0,
            last_error: None,
            state: CommandState::Pending,
        }
    }

    /// Returns the light this command addresses.
    #[must_use]
    pub fn light_id(&self) -> &LightId {
        &self.light_id
    }

    /// Returns the target temperature.
    #[must_use]
    pub fn target(&self) -> Kelvin {
        self.target
    }

    /// Returns how many retries have been scheduled so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the error of the most recent failed attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<&DeliveryError> {
        self.last_error.as_ref()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> &CommandState {
        &self.state
    }

    /// Returns true if the command is parked and its backoff has elapsed.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.state, CommandState::AwaitingBackoff { until } if until <= now)
    }

    /// Records a transient failure and parks the command until `until`.
    pub(crate) fn park(&mut self, error: DeliveryError, until: Instant) {
        self.retry_count += 1;
        self.last_error = Some(error);
        self.state = CommandState::AwaitingBackoff { until };
    }

    /// Returns a parked command to the pending state.
    pub(crate) fn wake(&mut self) {
        self.state = CommandState::Pending;
    }

    /// Marks the command as dropped.
    pub(crate) fn drop_with(&mut self, reason: DropReason) {
        self.state = CommandState::Dropped(reason);
    }

    /// Replaces the target with a newer one and resets the retry history.
    pub(crate) fn retarget(&mut self, target: Kelvin) {
        self.target = target;
        self.retry_count = 0;
        self.last_error = None;
        self.state = CommandState::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn command() -> UpdateCommand {
        UpdateCommand::new(LightId::new("desk"), Kelvin::new(4000).unwrap())
    }

    #[test]
    fn new_command_is_pending() {
        let cmd = command();
        assert_eq!(cmd.retry_count(), 0);
        assert!(cmd.last_error().is_none());
        assert_eq!(cmd.state(), &CommandState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn park_and_wake() {
        let mut cmd = command();
        let until = Instant::now() + Duration::from_secs(1);
        cmd.park(DeliveryError::RateLimited, until);

        assert_eq!(cmd.retry_count(), 1);
        assert_eq!(cmd.last_error(), Some(&DeliveryError::RateLimited));
        assert!(!cmd.is_due(Instant::now()));
        assert!(cmd.is_due(until));

        cmd.wake();
        assert_eq!(cmd.state(), &CommandState::Pending);
        assert!(!cmd.is_due(until));
    }

    #[tokio::test(start_paused = true)]
    async fn retarget_resets_history() {
        let mut cmd = command();
        cmd.park(DeliveryError::Timeout, Instant::now());
        cmd.retarget(Kelvin::new(5000).unwrap());

        assert_eq!(cmd.target().value(), 5000);
        assert_eq!(cmd.retry_count(), 0);
        assert!(cmd.last_error().is_none());
        assert_eq!(cmd.state(), &CommandState::Pending);
    }

    #[test]
    fn drop_reason_display() {
        let reason = DropReason::RetriesExhausted {
            attempts: 4,
            last_error: DeliveryError::RateLimited,
        };
        assert_eq!(reason.to_string(), "gave up after 4 attempts: rate limit exceeded");
        assert_eq!(DropReason::Superseded.to_string(), "superseded by a newer update");
    }
}
