/// StillImage node - emits a fixed raster every frame
///
/// The raster is looked up in the shared [`Resources`] under the key named
/// by the `resource` config entry (default `image`), as an `Arc<Raster>`.
/// Construction fails if it is missing.
use crate::config::NodeConfig;
use crate::graph::NodeContext;
use crate::node::Node;
use crate::raster::Raster;
use crate::registry::Resources;
use crate::value::{PortId, PortMap, Signal};
use std::sync::Arc;
use tracing::error;

pub const TYPE_NAME: &str = "StillImage";

pub const SOURCE_IMAGE: PortId = 1;

pub const DEFAULT_RESOURCE: &str = "image";

pub struct StillImageNode {
    name: String,
    image: Arc<Raster>,
}

impl StillImageNode {
    pub fn new(name: &str, image: Arc<Raster>) -> Self {
        Self {
            name: name.to_string(),
            image,
        }
    }

    pub fn from_config(name: &str, config: &NodeConfig, resources: &Resources) -> Option<Self> {
        let key = config
            .get("resource")
            .map(|v| v.as_text())
            .unwrap_or_else(|| DEFAULT_RESOURCE.to_string());
        match resources.get::<Arc<Raster>>(&key) {
            Some(image) => Some(Self::new(name, image.clone())),
            None => {
                error!("{}: no image resource named '{}'", name, key);
                None
            }
        }
    }

    pub fn image(&self) -> &Arc<Raster> {
        &self.image
    }
}

impl Node for StillImageNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn sources(&self) -> PortMap {
        &[("Image", SOURCE_IMAGE)]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_, '_>) {
        ctx.emit(SOURCE_IMAGE, Signal::Image(self.image.clone()));
    }
}
