//! Sensor payload handlers.
//!
//! Specialized [`crate::TopicHandler`]s registered by callers once a sensor
//! topic's message type is known from the topic catalogue. The core does not
//! register these itself.

pub mod image;
pub mod pointcloud;

pub use image::{ImageHandler, ImageSurfaceHost};
pub use pointcloud::{PointCloudHandler, PointsSink};

use crate::topic::TopicInfo;

/// Catalogue entries whose message type one of these handlers can decode.
///
/// Built from the advertised topic catalogue; callers use it to offer
/// point-cloud and image subscriptions without guessing topic names.
pub fn sensor_topics(catalogue: &[TopicInfo]) -> Vec<&TopicInfo> {
    catalogue
        .iter()
        .filter(|info| {
            matches!(
                info.msg_type.as_deref(),
                Some(ty) if ty.ends_with(".PointCloudPacked") || ty.ends_with(".Image")
            )
        })
        .collect()
}
