//! Scene reconciliation.
//!
//! Scene messages describe models and lights; pose messages move them. The
//! reconciler keeps an entity table matched by **display name** — the numeric
//! id is not a stable key, because it changes when simulation levels reload.
//! Pose updates correlate through the composite key (name concatenated with
//! the current id) only.
//!
//! The protocol has no entity-removal message, so the table only ever grows
//! during a connection and is cleared wholesale on disconnect. Whether that
//! is an intentional additive-only design or a latent growth problem is a
//! product question; the wire behavior is preserved here.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use simwire_core::{Color, Quaternion, Vector3};
use simwire_schema::DynMessage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::sink::{EntityKind, EntitySpec, RenderHandle, SceneSink};
use crate::topic::TopicHandler;

/// A reconciled scene-graph node.
#[derive(Clone, Debug)]
pub struct Entity {
    /// Display name — unique among live entities, the identity key.
    pub name: String,
    /// Current numeric id. Changes across level reloads; never an identity key.
    pub id: u64,
    /// Composite key (`name` + `id`) matching incoming pose tuples.
    pub unique_name: String,
    /// The sink-assigned render handle.
    pub handle: RenderHandle,
    /// Model or light.
    pub kind: EntityKind,
}

/// Reconciles scene and pose messages into an entity table, in arrival order.
pub struct SceneReconciler {
    sink: Arc<dyn SceneSink>,
    entities: Vec<Entity>,
    // Composite key -> handle, for pose correlation only.
    pose_index: HashMap<String, RenderHandle>,
}

impl SceneReconciler {
    /// Create an empty reconciler over the given sink.
    pub fn new(sink: Arc<dyn SceneSink>) -> Self {
        Self {
            sink,
            entities: Vec::new(),
            pose_index: HashMap::new(),
        }
    }

    /// Apply a scene snapshot or scene-delta message.
    pub fn apply_scene(&mut self, msg: &DynMessage) {
        for model in msg.list("model").iter().filter_map(|v| v.as_message()) {
            self.reconcile_model(model);
        }
        for light in msg.list("light").iter().filter_map(|v| v.as_message()) {
            self.materialize_light(light);
        }
        // Absent ambient is a no-op, not an error.
        if let Some(ambient) = msg.get_message("ambient") {
            self.sink.set_ambient(color_from(ambient));
        }
    }

    /// Apply a batch pose-update message.
    ///
    /// Tuples whose composite key matches no live entity are skipped
    /// silently — the entity may not be materialized yet, or belongs to a
    /// level not currently loaded.
    pub fn apply_pose(&mut self, msg: &DynMessage) {
        for pose in msg.list("pose").iter().filter_map(|v| v.as_message()) {
            let Some(name) = pose.get_str("name") else {
                continue;
            };
            let id = pose.get_u64("id").unwrap_or(0);
            let key = composite_key(name, id);
            if let Some(handle) = self.pose_index.get(&key) {
                self.sink.update_pose(
                    *handle,
                    pose.get_message("position").map_or(Vector3::ZERO, vector_from),
                    pose.get_message("orientation")
                        .map_or(Quaternion::IDENTITY, quaternion_from),
                );
            }
        }
    }

    /// The live entity table, in arrival order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Empty the table. Called on full disconnect; render objects are owned
    /// by the sink and are not individually removed here.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.pose_index.clear();
    }

    fn reconcile_model(&mut self, model: &DynMessage) {
        let Some(name) = model.get_str("name") else {
            return;
        };
        let id = model.get_u64("id").unwrap_or(0);

        // Matching is by display name only.
        let existing = self
            .entities
            .iter_mut()
            .find(|e| e.kind == EntityKind::Model && e.name == name);

        match existing {
            Some(entity) => {
                // Known entity whose id may have churned (level reload):
                // rebind the composite key, keep the render object.
                let _ = self.pose_index.remove(&entity.unique_name);
                entity.id = id;
                entity.unique_name = composite_key(name, id);
                let _ = self
                    .pose_index
                    .insert(entity.unique_name.clone(), entity.handle);
                debug!(name, id, "rebound existing entity");
            }
            None => {
                let handle = self.sink.add(&EntitySpec {
                    name,
                    kind: EntityKind::Model,
                    data: model,
                });
                let unique_name = composite_key(name, id);
                let _ = self.pose_index.insert(unique_name.clone(), handle);
                self.entities.push(Entity {
                    name: name.to_owned(),
                    id,
                    unique_name,
                    handle,
                    kind: EntityKind::Model,
                });
            }
        }
    }

    fn materialize_light(&mut self, light: &DynMessage) {
        let Some(name) = light.get_str("name") else {
            return;
        };
        // No light-update message exists; lights skip name reconciliation
        // and never enter the pose index.
        let handle = self.sink.add(&EntitySpec {
            name,
            kind: EntityKind::Light,
            data: light,
        });
        let id = light.get_u64("id").unwrap_or(0);
        self.entities.push(Entity {
            name: name.to_owned(),
            id,
            unique_name: composite_key(name, id),
            handle,
            kind: EntityKind::Light,
        });
    }
}

fn composite_key(name: &str, id: u64) -> String {
    format!("{name}{id}")
}

fn vector_from(msg: &DynMessage) -> Vector3 {
    // Absent components are protobuf defaults.
    Vector3::new(
        msg.get_f64("x").unwrap_or(0.0),
        msg.get_f64("y").unwrap_or(0.0),
        msg.get_f64("z").unwrap_or(0.0),
    )
}

fn quaternion_from(msg: &DynMessage) -> Quaternion {
    Quaternion::new(
        msg.get_f64("x").unwrap_or(0.0),
        msg.get_f64("y").unwrap_or(0.0),
        msg.get_f64("z").unwrap_or(0.0),
        msg.get_f64("w").unwrap_or(0.0),
    )
}

fn color_from(msg: &DynMessage) -> Color {
    Color::new(
        msg.get_f64("r").unwrap_or(0.0),
        msg.get_f64("g").unwrap_or(0.0),
        msg.get_f64("b").unwrap_or(0.0),
        msg.get_f64("a").unwrap_or(0.0),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Topic adapters
// ─────────────────────────────────────────────────────────────────────────────

/// Routes scene-delta messages from a subscribed topic into the reconciler.
pub struct SceneUpdates(Arc<Mutex<SceneReconciler>>);

impl SceneUpdates {
    /// Adapter over a shared reconciler.
    pub fn new(reconciler: Arc<Mutex<SceneReconciler>>) -> Self {
        Self(reconciler)
    }
}

impl TopicHandler for SceneUpdates {
    fn on_message(&mut self, msg: &DynMessage) {
        self.0.lock().apply_scene(msg);
    }
}

/// Routes pose-update messages from a subscribed topic into the reconciler.
pub struct PoseUpdates(Arc<Mutex<SceneReconciler>>);

impl PoseUpdates {
    /// Adapter over a shared reconciler.
    pub fn new(reconciler: Arc<Mutex<SceneReconciler>>) -> Self {
        Self(reconciler)
    }
}

impl TopicHandler for PoseUpdates {
    fn on_message(&mut self, msg: &DynMessage) {
        self.0.lock().apply_pose(msg);
    }
}

/// Drive a reconciler from the client's scene-info stream.
///
/// Applies the current snapshot and every subsequent one; when the stream
/// emits `None` (teardown) the entity table is cleared unconditionally.
pub fn spawn_scene_task(
    reconciler: Arc<Mutex<SceneReconciler>>,
    mut scene_info: watch::Receiver<Option<Arc<DynMessage>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            {
                let snapshot = scene_info.borrow_and_update().clone();
                match snapshot {
                    Some(msg) => reconciler.lock().apply_scene(&msg),
                    None => reconciler.lock().clear(),
                }
            }
            if scene_info.changed().await.is_err() {
                break;
            }
        }
    })
}
