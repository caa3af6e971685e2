//! The watch face: state machine, ticks, paints and rendering.

pub mod engine;
pub mod events;
pub mod paint;
pub mod render;
pub mod runner;
pub mod scheduler;
pub mod state;

pub use engine::FaceEngine;
pub use events::{FaceEvent, FaceMailbox, MAILBOX_CAPACITY, MailboxHandle, MailboxSink, TapKind};
pub use paint::{FacePaints, Paint};
pub use render::{Anchor, DrawOp, FaceRenderer, FaceView, Frame, TextRole};
pub use runner::FaceRunner;
pub use scheduler::{TickKind, TickScheduler, delay_to_boundary};
pub use state::{
    BackgroundVisibility, FaceState, PeekMode, PowerMode, Visibility, WatchFaceStyle,
};
