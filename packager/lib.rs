//! Core live-packaging library: ISO-BMFF/MPEG-TS/packed-audio segment
//! builders, sample-level encryption, and per-codec bitstream adapters,
//! tied together behind the [`facade::LivePackager`] entry point.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod facade;
pub mod isobmff;
pub mod model;
pub mod packed_audio;
pub mod ts;

pub use crate::config::Config;
pub use crate::facade::LivePackager;
pub use crate::model::{MediaSample, SegmentBuffer, StreamInfo};
