//! # smokewatch-types
//!
//! Core types shared by the smokewatch publisher and monitors.
//!
//! ## Contents
//!
//! - [`ChannelId`]: the three monitored channels (smoker, food A, food B)
//! - [`Reading`] and [`TimeStep`]: values produced by a reading source
//! - [`WireMessage`]: the `"<timestamp>, <value>"` text payload carried on the transport
//! - [`Router`]: maps a channel to its destination and serializes readings
//! - [`AlertEvent`]: raised by a monitor when its anomaly predicate holds
//!
//! ## Features
//!
//! - `serde`: `Serialize`/`Deserialize` for every public type
//!
//! ## Example
//!
//! ```rust
//! use smokewatch_types::{ChannelId, Reading, Router, WireMessage};
//!
//! let router = Router::default();
//! let reading = Reading::new("03/23/24 11:06:01", ChannelId::Smoker, 225.0);
//!
//! assert_eq!(router.route(ChannelId::Smoker), "01-smoker");
//!
//! let message = router.serialize(&reading);
//! assert_eq!(message.encode(), "03/23/24 11:06:01, 225.0");
//!
//! let parsed = WireMessage::parse(message.encode().as_bytes()).unwrap();
//! assert_eq!(parsed.value, 225.0);
//! ```

mod alert;
mod channel;
mod reading;
mod router;
mod wire;

pub use alert::*;
pub use channel::*;
pub use reading::*;
pub use router::*;
pub use wire::*;
