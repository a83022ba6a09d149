pub mod control;
pub mod device;
pub mod drain;
pub mod error;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transport;


// Re-export the main entry points for easy access
pub use control::ControlChannel;
pub use device::{DeviceSelector, UsbTransport};
pub use drain::StreamDrain;
pub use error::{DrainError, FrameError, SessionError, TransportError};
pub use protocol::{Command, ReplyMeaning};
pub use session::{Session, SessionConfig, SessionReport, SessionState};
pub use sink::{OutputSink, Sink, SinkTarget};
pub use transport::BulkTransport;
