//! Per-frame context handed to the entry point.
//!
//! Hosts describe a frame however they like by implementing [`FrameContext`];
//! [`RenderFrame`] is the shape used by the CLI and the tests.

use rhai::{Dynamic, Map, FLOAT, INT};

pub trait FrameContext {
    /// Build the value passed as `Main`'s single argument.
    fn to_dynamic(&self) -> Dynamic;
}

/// A rendered frame as seen by a batch render post-effect.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub frame: u64,
    pub time: f32,
    pub fps: f32,
    pub width: u32,
    pub height: u32,
    /// Where the host wrote this frame, if it was saved.
    pub output_path: Option<String>,
}

impl RenderFrame {
    pub fn new(frame: u64, fps: f32, width: u32, height: u32) -> Self {
        let time = if fps > 0.0 { frame as f32 / fps } else { 0.0 };
        Self {
            frame,
            time,
            fps,
            width,
            height,
            output_path: None,
        }
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

impl FrameContext for RenderFrame {
    fn to_dynamic(&self) -> Dynamic {
        let mut ctx = Map::new();
        ctx.insert("__type".into(), Dynamic::from("frame_ctx"));
        ctx.insert("frame".into(), Dynamic::from(self.frame as INT));
        ctx.insert("time".into(), Dynamic::from(self.time as FLOAT));
        ctx.insert("fps".into(), Dynamic::from(self.fps as FLOAT));
        ctx.insert("width".into(), Dynamic::from(self.width as INT));
        ctx.insert("height".into(), Dynamic::from(self.height as INT));
        let output = match &self.output_path {
            Some(path) => Dynamic::from(path.clone()),
            None => Dynamic::UNIT,
        };
        ctx.insert("output_path".into(), output);
        Dynamic::from(ctx)
    }
}

impl FrameContext for Map {
    fn to_dynamic(&self) -> Dynamic {
        Dynamic::from(self.clone())
    }
}

impl FrameContext for Dynamic {
    fn to_dynamic(&self) -> Dynamic {
        self.clone()
    }
}
