//! Image topic handler.
//!
//! Each image topic gets one persistent display surface in a host container,
//! keyed by a sanitized topic name. Every message's payload is re-encoded
//! with the standard base64 alphabet into a `data:` URI and assigned as the
//! surface's source.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use simwire_schema::DynMessage;

use crate::topic::TopicHandler;

/// Container that hosts per-topic display surfaces, implemented by the UI.
pub trait ImageSurfaceHost: Send + Sync {
    /// Create a surface. `label` is the raw topic name, for tooltips.
    fn create_surface(&self, surface_id: &str, label: &str);

    /// Assign the surface's displayable source (a `data:` URI).
    fn set_source(&self, surface_id: &str, data_uri: &str);

    /// Remove the surface from the container.
    fn remove_surface(&self, surface_id: &str);
}

/// Topic handler for image streams.
pub struct ImageHandler {
    surface_id: String,
    host: Arc<dyn ImageSurfaceHost>,
}

impl ImageHandler {
    /// Create the handler and its display surface.
    pub fn new(topic: impl Into<String>, host: Arc<dyn ImageSurfaceHost>) -> Self {
        let topic = topic.into();
        // Topic names are slash-delimited paths; surface ids must not be.
        let surface_id = topic.replace('/', "-");
        host.create_surface(&surface_id, &topic);
        Self { surface_id, host }
    }

    /// The sanitized surface id this handler owns.
    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }
}

impl TopicHandler for ImageHandler {
    fn on_message(&mut self, msg: &DynMessage) {
        let Some(data) = msg.get_bytes("data") else {
            return;
        };
        let encoded = STANDARD.encode(data);
        self.host
            .set_source(&self.surface_id, &format!("data:image/png;base64,{encoded}"));
    }

    fn on_unsubscribe(&mut self) {
        self.host.remove_surface(&self.surface_id);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use parking_lot::Mutex;
    use simwire_schema::DynValue;

    use super::*;

    #[derive(Default)]
    struct RecordingHost {
        created: Mutex<Vec<(String, String)>>,
        sources: Mutex<Vec<(String, String)>>,
        removed: Mutex<Vec<String>>,
    }

    impl ImageSurfaceHost for RecordingHost {
        fn create_surface(&self, surface_id: &str, label: &str) {
            self.created.lock().push((surface_id.into(), label.into()));
        }
        fn set_source(&self, surface_id: &str, data_uri: &str) {
            self.sources.lock().push((surface_id.into(), data_uri.into()));
        }
        fn remove_surface(&self, surface_id: &str) {
            self.removed.lock().push(surface_id.into());
        }
    }

    fn image_message(data: &[u8]) -> DynMessage {
        let mut msg = DynMessage::new("gz.msgs.Image");
        msg.set("data", DynValue::Bytes(Bytes::copy_from_slice(data)));
        msg
    }

    #[test]
    fn creates_surface_with_sanitized_id() {
        let host = Arc::new(RecordingHost::default());
        let handler = ImageHandler::new("/world/shapes/camera/image", host.clone());
        assert_eq!(handler.surface_id(), "-world-shapes-camera-image");
        let created = host.created.lock();
        assert_eq!(
            created.as_slice(),
            [(
                "-world-shapes-camera-image".to_owned(),
                "/world/shapes/camera/image".to_owned()
            )]
        );
    }

    #[test]
    fn message_sets_base64_data_uri() {
        let host = Arc::new(RecordingHost::default());
        let mut handler = ImageHandler::new("/cam", host.clone());
        handler.on_message(&image_message(&[1, 2, 3]));

        let sources = host.sources.lock();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].0, "-cam");
        // Standard alphabet, with padding.
        assert_eq!(sources[0].1, "data:image/png;base64,AQID");
    }

    #[test]
    fn message_without_data_is_ignored() {
        let host = Arc::new(RecordingHost::default());
        let mut handler = ImageHandler::new("/cam", host.clone());
        handler.on_message(&DynMessage::new("gz.msgs.Image"));
        assert!(host.sources.lock().is_empty());
    }

    #[test]
    fn unsubscribe_removes_surface() {
        let host = Arc::new(RecordingHost::default());
        let mut handler = ImageHandler::new("/cam", host.clone());
        handler.on_unsubscribe();
        assert_eq!(host.removed.lock().as_slice(), ["-cam".to_owned()]);
    }

    #[test]
    fn every_message_updates_the_same_surface() {
        let host = Arc::new(RecordingHost::default());
        let mut handler = ImageHandler::new("/cam", host.clone());
        handler.on_message(&image_message(b"a"));
        handler.on_message(&image_message(b"b"));
        let sources = host.sources.lock();
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().all(|(id, _)| id == "-cam"));
    }
}
