// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delivery event types.

use std::time::Duration;

use crate::delivery::DropReason;
use crate::error::DeliveryError;
use crate::types::{Kelvin, LightId};

/// Events emitted by the delivery queue.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    /// A new command was appended to the queue.
    Queued {
        /// The addressed light.
        light: LightId,
        /// The requested temperature.
        target: Kelvin,
    },

    /// An update for an excluded light was skipped.
    Excluded {
        /// The excluded light.
        light: LightId,
    },

    /// A waiting command was replaced by a newer target for the same light.
    Superseded {
        /// The addressed light.
        light: LightId,
        /// The target that will no longer be delivered.
        previous: Kelvin,
        /// The target that replaced it.
        target: Kelvin,
    },

    /// The gateway accepted the update.
    Delivered {
        /// The addressed light.
        light: LightId,
        /// The applied temperature.
        target: Kelvin,
        /// Number of attempts it took, including the successful one.
        attempts: u32,
    },

    /// A transient failure occurred and the command was parked for a retry.
    RetryScheduled {
        /// The addressed light.
        light: LightId,
        /// Retry number (1-based).
        retry: u32,
        /// Backoff before the command rejoins the queue.
        delay: Duration,
        /// The failure that triggered the retry.
        error: DeliveryError,
    },

    /// A parked command rejoined the head of the queue.
    Requeued {
        /// The addressed light.
        light: LightId,
        /// Retry number (1-based).
        retry: u32,
    },

    /// A command was removed without being delivered.
    Dropped {
        /// The addressed light.
        light: LightId,
        /// The temperature that was not applied.
        target: Kelvin,
        /// Why the command was dropped.
        reason: DropReason,
    },
}

impl DeliveryEvent {
    /// Returns the light this event concerns.
    #[must_use]
    pub fn light(&self) -> &LightId {
        match self {
            Self::Queued { light, .. }
            | Self::Excluded { light }
            | Self::Superseded { light, .. }
            | Self::Delivered { light, .. }
            | Self::RetryScheduled { light, .. }
            | Self::Requeued { light, .. }
            | Self::Dropped { light, .. } => light,
        }
    }

    /// Returns true if this event ends a command's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered { .. } | Self::Dropped { .. } | Self::Excluded { .. }
        )
    }
}
