//! Typed values that travel across connections
//!
//! Every port carries a [`Signal`]. Port tags are small integers that only
//! mean something inside the node type that declares them, so the float,
//! vector, colour, image, path and text kinds all share one tag namespace
//! per node.

use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Port tag, scoped to the node type that declares it
pub type PortId = i32;

/// Static name -> tag table a node type publishes for its sinks or sources
pub type PortMap = &'static [(&'static str, PortId)];

/// Look up a port tag by name
pub fn port_id(map: PortMap, name: &str) -> Option<PortId> {
    map.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
}

/// Look up a port name by tag (for diagnostics)
pub fn port_name(map: PortMap, id: PortId) -> Option<&'static str> {
    map.iter().find(|(_, i)| *i == id).map(|(n, _)| *n)
}

/// Linear RGBA colour with float channels in 0..1
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_array(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// A value flowing along a connection
///
/// Images are reference counted so fan-out to several sinks never copies
/// pixel data.
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Color(Rgba),
    Image(Arc<Raster>),
    Path(Arc<Vec<[f32; 2]>>),
    Text(String),
}

impl Signal {
    /// Short name of the value kind, used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Float(_) => "float",
            Signal::Vec2(_) => "vec2",
            Signal::Vec3(_) => "vec3",
            Signal::Vec4(_) => "vec4",
            Signal::Color(_) => "color",
            Signal::Image(_) => "image",
            Signal::Path(_) => "path",
            Signal::Text(_) => "text",
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Signal::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Colour view of the value; a vec4 is accepted as RGBA
    pub fn as_color(&self) -> Option<Rgba> {
        match self {
            Signal::Color(c) => Some(*c),
            Signal::Vec4(v) => Some(Rgba::from_array(*v)),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Arc<Raster>> {
        match self {
            Signal::Image(img) => Some(img),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Float(v) => write!(f, "{:.4}", v),
            Signal::Vec2(v) => write!(f, "({:.3}, {:.3})", v[0], v[1]),
            Signal::Vec3(v) => write!(f, "({:.3}, {:.3}, {:.3})", v[0], v[1], v[2]),
            Signal::Vec4(v) => write!(f, "({:.3}, {:.3}, {:.3}, {:.3})", v[0], v[1], v[2], v[3]),
            Signal::Color(c) => write!(f, "RGBA({:.2}, {:.2}, {:.2}, {:.2})", c.r, c.g, c.b, c.a),
            Signal::Image(img) => write!(f, "image {}x{}", img.width(), img.height()),
            Signal::Path(p) => write!(f, "path of {} points", p.len()),
            Signal::Text(t) => write!(f, "\"{}\"", t),
        }
    }
}
