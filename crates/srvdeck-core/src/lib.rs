pub mod color;
pub mod console;
pub mod controller;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stats;
pub mod tabs;

pub use color::{color_of, Hsla, NEUTRAL};
pub use console::{ConsoleInput, ConsoleOp, GlyphMeasure, InputMode, TimestampSource};
pub use controller::{Effects, SessionController, SessionEvent};
pub use protocol::{
    ClientCommand, CommandCodec, Decoded, Envelope, Frame, FrameEncoding, LineKind, LogLine,
    ServerCommand,
};
pub use registry::InstanceRegistry;
pub use session::{ChannelError, ChannelEvent, ChannelSession, ChannelState, ChannelStatus};
