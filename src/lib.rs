//! # MarkSynth - Generative Node Graph Engine
//!
//! MarkSynth is the control substrate of a live generative visuals engine:
//! a frame-synchronous graph of small nodes that pass typed signals to each
//! other, with every tweakable parameter blended between an operator's
//! manual value, an autonomous value arriving over a connection, and a
//! target derived from the active artistic intent.
//!
//! ## Core Features
//!
//! - **Node Graph**: named nodes with typed sinks and sources, wired by a
//!   one-line-per-connection text form, delivered synchronously each frame
//! - **Parameter Blending**: manual / autonomous / intent weighting driven
//!   by agency, rate limited and smoothed
//! - **Intent Presets**: five-dimension presets (energy, density, structure,
//!   chaos, granularity) blended by smoothed activations
//! - **Memory Bank**: eight slots of archived content with biased random
//!   recall and folder persistence
//! - **Agency**: manual agency plus auto agency contributed by nodes, with
//!   register-shift bookkeeping when nodes fire
//! - **Snapshots**: eight named slots of captured node parameters per
//!   configuration, applied with one level of undo
//! - **Hot Reload**: configurations swap in place, carrying parameter
//!   adjustments across by node name
//!
//! ## Quick Start
//!
//! ```rust
//! use marksynth::config::SynthConfig;
//! use marksynth::memory_bank::MemoryBank;
//! use marksynth::registry::{NodeRegistry, Resources};
//! use marksynth::synth::Synth;
//!
//! let config = SynthConfig::parse(r#"
//! name = "pulse"
//! connections = """
//! Random.Float -> Scale.float
//! Scale.float -> .AgencyAuto
//! """
//!
//! [[nodes]]
//! name = "Random"
//! type = "RandomFloat"
//! config = { seed = 7 }
//!
//! [[nodes]]
//! name = "Scale"
//! type = "MultiplyAdd"
//! config = { Multiplier = 0.5 }
//! "#).unwrap();
//!
//! let mut synth = Synth::new(MemoryBank::with_seed(7));
//! let report = synth
//!     .load(&config, &NodeRegistry::with_builtins(), &Resources::new())
//!     .unwrap();
//! assert_eq!(report.connections, 2);
//!
//! for _ in 0..60 {
//!     synth.update(1.0 / 60.0);
//! }
//! // Auto agency from the scaled random stream, never above 0.5
//! assert!(synth.agency() <= 0.5);
//! ```
//!
//! ## Connection Text
//!
//! ```text
//! # source.Port -> sink.Port
//! Points.PointVelocity -> Magnitude.PointVelocity
//! Magnitude.MeanScalar -> Agency.Characteristic
//! Agency.AutoAgency -> .AgencyAuto
//! Still.Image -> .Composite
//! Agency.Trigger -> .MemorySave
//! ```
//!
//! An empty node name addresses the engine host, whose sinks cover the
//! background colour, composite content, randomness reset, auto agency and
//! the memory bank, and whose `Memory` source emits recalled content.

pub mod agency;
pub mod blender;
pub mod config;
pub mod graph;
pub mod host;
pub mod intent;
pub mod live;
pub mod mapping;
pub mod memory_bank;
pub mod memory_controller;
pub mod node;
pub mod nodes;
pub mod param;
pub mod raster;
pub mod registry;
pub mod snapshot;
pub mod synth;
pub mod value;
