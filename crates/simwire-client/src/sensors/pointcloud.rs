//! Point-cloud topic handler.
//!
//! Decodes packed point-cloud messages into flat position buffers and feeds
//! them to a points sink attached to the owning sensor frame. The frame is
//! resolved once, from the `frame_id` metadata key in the message header,
//! through the scene sink's name lookup.

use std::sync::Arc;

use simwire_schema::DynMessage;
use tracing::{debug, warn};

use crate::sink::{RenderHandle, SceneSink};
use crate::topic::TopicHandler;

/// Receiver for decoded point buffers, implemented by the renderer.
pub trait PointsSink: Send + Sync {
    /// Parent the points object under the resolved sensor entity. Called once.
    fn attach(&self, entity: RenderHandle);

    /// Replace the point positions: one `[x, y, z]` triplet per point.
    fn set_positions(&self, positions: &[f32]);

    /// Remove the points object from its entity.
    fn detach(&self);
}

/// Topic handler for packed point-cloud messages.
pub struct PointCloudHandler {
    topic: String,
    scene: Arc<dyn SceneSink>,
    points: Arc<dyn PointsSink>,
    attached: Option<RenderHandle>,
}

impl PointCloudHandler {
    /// Create a handler for `topic`, resolving the owning frame via `scene`
    /// and delivering buffers to `points`.
    pub fn new(
        topic: impl Into<String>,
        scene: Arc<dyn SceneSink>,
        points: Arc<dyn PointsSink>,
    ) -> Self {
        Self {
            topic: topic.into(),
            scene,
            points,
            attached: None,
        }
    }

    fn try_attach(&mut self, msg: &DynMessage) {
        let Some(frame) = frame_id(msg) else {
            return;
        };
        match self.scene.find_by_name(frame) {
            Some(handle) => {
                self.points.attach(handle);
                self.attached = Some(handle);
            }
            // The frame may materialize later; retried on the next message.
            None => debug!(topic = %self.topic, frame, "sensor frame not in scene yet"),
        }
    }
}

impl TopicHandler for PointCloudHandler {
    fn on_message(&mut self, msg: &DynMessage) {
        if self.attached.is_none() {
            self.try_attach(msg);
        }
        match decode_positions(msg) {
            Some(positions) => self.points.set_positions(&positions),
            None => warn!(topic = %self.topic, "dropping malformed point-cloud payload"),
        }
    }

    fn on_unsubscribe(&mut self) {
        if self.attached.take().is_some() {
            self.points.detach();
        }
    }
}

/// The `frame_id` entry of the message header's key/value metadata.
fn frame_id(msg: &DynMessage) -> Option<&str> {
    msg.get_message("header")?
        .list("data")
        .iter()
        .filter_map(|v| v.as_message())
        .find(|entry| entry.get_str("key") == Some("frame_id"))?
        .list("value")
        .first()?
        .as_str()
}

/// Decode the packed payload into one 3-component vertex per point.
///
/// Walks `height × width` points through the declared `row_step` /
/// `point_step` strides, reading three 4-byte floats per point in the
/// message's declared endianness. Non-finite components are replaced with
/// `0`. Returns `None` when the strides run past the payload.
#[allow(clippy::cast_possible_truncation)]
pub fn decode_positions(msg: &DynMessage) -> Option<Vec<f32>> {
    let height = msg.get_u64("height").unwrap_or(0) as usize;
    let width = msg.get_u64("width").unwrap_or(0) as usize;
    let row_step = msg.get_u64("row_step").unwrap_or(0) as usize;
    let point_step = msg.get_u64("point_step").unwrap_or(0) as usize;
    let big_endian = msg.get_bool("is_bigendian").unwrap_or(false);
    let data = msg.get_bytes("data").map_or(&[][..], |b| b.as_ref());

    let total = height.checked_mul(width)?.checked_mul(3)?;
    let mut positions = Vec::new();
    positions.try_reserve(total).ok()?;
    for j in 0..height {
        for i in 0..width {
            let base = j.checked_mul(row_step)?.checked_add(i.checked_mul(point_step)?)?;
            for component in 0..3 {
                let value = read_f32(data, base.checked_add(component * 4)?, big_endian)?;
                positions.push(if value.is_finite() { value } else { 0.0 });
            }
        }
    }
    Some(positions)
}

fn read_f32(data: &[u8], offset: usize, big_endian: bool) -> Option<f32> {
    let bytes: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(if big_endian {
        f32::from_be_bytes(bytes)
    } else {
        f32::from_le_bytes(bytes)
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use parking_lot::Mutex;
    use simwire_core::{Color, Quaternion, Vector3};
    use simwire_schema::DynValue;

    use super::*;
    use crate::sink::{EntitySpec, SceneSink};

    // -- test doubles --

    struct NamedSink {
        known: &'static str,
    }

    impl SceneSink for NamedSink {
        fn add(&self, _spec: &EntitySpec<'_>) -> RenderHandle {
            RenderHandle(0)
        }
        fn find_by_name(&self, name: &str) -> Option<RenderHandle> {
            (name == self.known).then_some(RenderHandle(77))
        }
        fn update_pose(&self, _h: RenderHandle, _p: Vector3, _o: Quaternion) {}
        fn set_ambient(&self, _c: Color) {}
        fn remove(&self, _h: RenderHandle) {}
    }

    #[derive(Default)]
    struct RecordingPoints {
        attached: Mutex<Option<RenderHandle>>,
        buffers: Mutex<Vec<Vec<f32>>>,
        detached: Mutex<bool>,
    }

    impl PointsSink for RecordingPoints {
        fn attach(&self, entity: RenderHandle) {
            *self.attached.lock() = Some(entity);
        }
        fn set_positions(&self, positions: &[f32]) {
            self.buffers.lock().push(positions.to_vec());
        }
        fn detach(&self) {
            *self.detached.lock() = true;
        }
    }

    // -- message builders --

    fn cloud_message(
        frame: Option<&str>,
        height: u64,
        width: u64,
        point_step: u64,
        data: Vec<u8>,
        big_endian: bool,
    ) -> DynMessage {
        let mut msg = DynMessage::new("gz.msgs.PointCloudPacked");
        if let Some(frame) = frame {
            let mut entry = DynMessage::new("gz.msgs.Header.Map");
            entry.set("key", DynValue::String("frame_id".into()));
            entry.set("value", DynValue::List(vec![DynValue::String(frame.into())]));
            let mut header = DynMessage::new("gz.msgs.Header");
            header.set("data", DynValue::List(vec![DynValue::Message(entry)]));
            msg.set("header", DynValue::Message(header));
        }
        msg.set("height", DynValue::UInt(height));
        msg.set("width", DynValue::UInt(width));
        msg.set("point_step", DynValue::UInt(point_step));
        msg.set("row_step", DynValue::UInt(width * point_step));
        msg.set("is_bigendian", DynValue::Bool(big_endian));
        msg.set("data", DynValue::Bytes(Bytes::from(data)));
        msg
    }

    fn le_points(points: &[[f32; 3]], point_step: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for p in points {
            let start = data.len();
            for c in p {
                data.extend_from_slice(&c.to_le_bytes());
            }
            data.resize(start + point_step, 0);
        }
        data
    }

    // -- decode --

    #[test]
    fn decode_roundtrip_with_nan_replaced() {
        let data = le_points(&[[1.0, f32::NAN, 3.0], [4.0, 5.0, 6.0]], 16);
        let msg = cloud_message(None, 1, 2, 16, data, false);
        let positions = decode_positions(&msg).unwrap();
        assert_eq!(positions.len(), 6);
        assert_eq!(positions, [1.0, 0.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn decode_infinite_replaced_others_preserved() {
        let data = le_points(&[[f32::INFINITY, -2.5, 0.125]], 12);
        let msg = cloud_message(None, 1, 1, 12, data, false);
        assert_eq!(decode_positions(&msg).unwrap(), [0.0, -2.5, 0.125]);
    }

    #[test]
    fn decode_big_endian() {
        let mut data = Vec::new();
        for c in [1.5f32, 2.5, -3.5] {
            data.extend_from_slice(&c.to_be_bytes());
        }
        let msg = cloud_message(None, 1, 1, 12, data, true);
        assert_eq!(decode_positions(&msg).unwrap(), [1.5, 2.5, -3.5]);
    }

    #[test]
    fn decode_short_payload_is_none() {
        let msg = cloud_message(None, 1, 2, 16, vec![0u8; 8], false);
        assert!(decode_positions(&msg).is_none());
    }

    #[test]
    fn decode_empty_cloud_is_empty() {
        let msg = cloud_message(None, 0, 0, 16, Vec::new(), false);
        assert_eq!(decode_positions(&msg).unwrap(), Vec::<f32>::new());
    }

    // -- attach lifecycle --

    #[test]
    fn attaches_once_via_frame_id() {
        let scene = Arc::new(NamedSink { known: "lidar_link" });
        let points = Arc::new(RecordingPoints::default());
        let mut handler =
            PointCloudHandler::new("/scan", scene, points.clone());

        let data = le_points(&[[0.0, 0.0, 0.0]], 12);
        let msg = cloud_message(Some("lidar_link"), 1, 1, 12, data, false);
        handler.on_message(&msg);
        handler.on_message(&msg);

        assert_eq!(*points.attached.lock(), Some(RenderHandle(77)));
        assert_eq!(points.buffers.lock().len(), 2);
    }

    #[test]
    fn unknown_frame_keeps_decoding_without_attach() {
        let scene = Arc::new(NamedSink { known: "other" });
        let points = Arc::new(RecordingPoints::default());
        let mut handler = PointCloudHandler::new("/scan", scene, points.clone());

        let data = le_points(&[[1.0, 2.0, 3.0]], 12);
        handler.on_message(&cloud_message(Some("lidar_link"), 1, 1, 12, data, false));

        assert!(points.attached.lock().is_none());
        assert_eq!(points.buffers.lock().len(), 1);
    }

    #[test]
    fn unsubscribe_detaches_only_when_attached() {
        let scene = Arc::new(NamedSink { known: "lidar_link" });
        let points = Arc::new(RecordingPoints::default());
        let mut handler = PointCloudHandler::new("/scan", scene.clone(), points.clone());

        handler.on_unsubscribe();
        assert!(!*points.detached.lock());

        let data = le_points(&[[0.0, 0.0, 0.0]], 12);
        handler.on_message(&cloud_message(Some("lidar_link"), 1, 1, 12, data, false));
        handler.on_unsubscribe();
        assert!(*points.detached.lock());
    }
}
