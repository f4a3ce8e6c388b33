// ABOUTME: Interactive terminal sessions bridged from a browser socket into a container
// Shell discovery, idle timeouts and initial terminal size negotiation live here

pub mod adapter;
pub mod bridge;
pub mod controller;
pub mod error;
pub mod prober;
pub mod protocol;
pub mod session;
pub mod size;
pub mod transport;
pub mod watchdog;

pub use adapter::{TransportAdapter, END_OF_TRANSMISSION};
pub use bridge::ExecStreamBridge;
pub use controller::{SessionController, TerminalRequest};
pub use error::{TerminalError, CLOSE_EXEC_FAILED, CLOSE_IDLE_TIMEOUT, CLOSE_NORMAL};
pub use prober::{select_shell, ShellProber, VALID_SHELLS};
pub use protocol::{Operation, TerminalMessage};
pub use session::{CloseReason, Session, SessionState};
pub use size::SizeNegotiator;
pub use transport::{channel_socket, FrameSink, FrameSource, SocketEvent, TransportError};
pub use watchdog::Watchdog;
