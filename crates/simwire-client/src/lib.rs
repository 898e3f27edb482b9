//! # simwire-client
//!
//! Real-time simulation telemetry client. Opens one persistent websocket
//! connection to a running simulation, performs the capability handshake,
//! receives the runtime message schema, multiplexes logical topics over the
//! single connection, and reconciles an in-memory scene-graph entity table
//! from snapshots and delta updates.
//!
//! - [`TelemetryClient`]: socket lifecycle, handshake, status state machine
//! - [`TopicHandler`] / [`Subscription`]: the open-ended per-topic handler seam
//! - [`SceneReconciler`]: entity table kept consistent across simulation
//!   level reloads, feeding an external [`SceneSink`]
//! - [`sensors`]: point-cloud and image payload handlers
//!
//! Frame processing is strictly sequential: the connection task decodes and
//! dispatches one inbound unit at a time, so handlers may mutate shared state
//! without locking discipline beyond their own wrappers.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod frame;
pub mod reconciler;
pub mod sensors;
pub mod sink;
pub mod topic;

pub use connection::TelemetryClient;
pub use errors::{ClientError, ConnectionFailure, FrameError};
pub use frame::Frame;
pub use reconciler::{PoseUpdates, SceneReconciler, SceneUpdates, spawn_scene_task};
pub use sink::{EntityKind, EntitySpec, RenderHandle, SceneSink};
pub use topic::{Subscription, TopicHandler, TopicInfo};

// The status and message types flow through the whole public API; re-export
// them so embedders don't need the leaf crates for the common path.
pub use simwire_core::ConnectionStatus;
pub use simwire_schema::{DynMessage, DynValue};
