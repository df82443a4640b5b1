// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Daylight Sync - keep light fixtures at a color temperature that follows
//! the sun.
//!
//! The library combines three pieces:
//!
//! - **Solar model**: maps time and location to a color temperature, warm at
//!   night and coolest at solar noon ([`solar`])
//! - **Light state**: owns the current temperature and debounces bursts of
//!   input into a single update ([`light`], [`auto_mode`])
//! - **Delivery**: pushes updates to the lights one at a time, retrying
//!   transient failures with exponential backoff ([`delivery`])
//!
//! Lights are reached through a [`LightGateway`](gateway::LightGateway). A
//! Philips Hue bridge client is included behind the `hue` feature.
//!
//! # Quick Start
//!
//! ```no_run
//! use daylight_sync::{DaylightConfig, DaylightSync};
//!
//! #[tokio::main]
//! async fn main() -> daylight_sync::Result<()> {
//!     let config = DaylightConfig::from_json(
//!         r#"{
//!             "bridgeAddress": "192.168.1.20",
//!             "apiToken": "app-key",
//!             "latitude": 52.52,
//!             "longitude": 13.405
//!         }"#,
//!     )?;
//!     let Some(bridge) = config.hue_bridge() else {
//!         return Ok(());
//!     };
//!
//!     let sync = DaylightSync::start(config, bridge.into_client()?).await?;
//!     println!("Lights at {}", sync.state().current_temp);
//!
//!     // Any manual change switches automatic tracking off
//!     sync.light().set_target_by_slider(30)?;
//!     sync.auto_mode().enable();
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     sync.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Watching State
//!
//! ```no_run
//! # async fn example(sync: daylight_sync::DaylightSync<daylight_sync::gateway::HueBridgeClient>) {
//! let mut snapshots = sync.light().subscribe();
//! let mut events = sync.queue().subscribe();
//!
//! tokio::spawn(async move {
//!     while snapshots.changed().await.is_ok() {
//!         let snapshot = *snapshots.borrow_and_update();
//!         println!("{} / {} / slider {}", snapshot.kelvin, snapshot.mired, snapshot.slider);
//!     }
//! });
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod auto_mode;
pub mod config;
mod daylight;
pub mod delivery;
pub mod error;
pub mod event;
pub mod gateway;
pub mod light;
pub mod solar;
pub mod types;

pub use auto_mode::{AutoModeController, AutoModeState};
pub use config::{ConfigIssue, DaylightConfig};
pub use daylight::{DaylightSync, TransitionState};
pub use delivery::{DeliveryQueue, EnqueueOutcome, QueueStats, RetryPolicy, UpdateSink};
pub use error::{ConfigError, DeliveryError, Error, Result, ValueError};
pub use event::DeliveryEvent;
pub use gateway::{LightGateway, LightInfo};
pub use light::{LightSnapshot, LightStateController};
pub use solar::{AstronomyProvider, Clock, NoaaAstronomy, SolarConfig, SolarTransitionCalculator};
pub use types::{Kelvin, LightId, Mired, SliderPosition, TemperatureRange};

#[cfg(feature = "hue")]
pub use gateway::{HueBridgeClient, HueBridgeConfig};
