//! Location subsystem for Sitepin.
//!
//! Turns freeform input (typed text, pasted map links, addresses, share
//! payloads) and device readings into a [`ResolvedLocation`], falling back one
//! strategy at a time.

use std::future::Future;
use std::pin::Pin;

pub mod acquirer;
pub mod extract;
pub mod geocoder;
pub mod links;
pub mod pipeline;
pub mod sensor;
pub mod share;
pub mod types;

/// Boxed future returned by the service traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use acquirer::{AcquirerConfig, Located, LocationAcquirer, LocationEvent};
pub use extract::extract;
pub use pipeline::{InputField, Resolution, ResolutionStatus, Resolvers};
pub use sensor::{Fix, NetworkSensor, PositionSensor, SensorError};
pub use share::SharedLocation;
pub use types::{Coordinate, LocationError, LocationSource, Notice, ResolvedLocation, SiteDraft};
