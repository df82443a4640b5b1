// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delivery outcomes as events.
//!
//! The [`DeliveryQueue`](crate::delivery::DeliveryQueue) broadcasts every
//! step of a command's lifecycle. Subscribers see the same information that
//! is logged, in structured form. A subscriber that falls more than 256
//! events behind receives `RecvError::Lagged` and skips ahead.

mod delivery_event;

pub use delivery_event::DeliveryEvent;
