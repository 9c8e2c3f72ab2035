pub mod client;
pub mod config;
pub mod error;
pub mod game_log;
pub mod panel;
pub mod protocol;
pub mod session;
pub mod state;

pub use client::{ClientCommand, ClientView, GameClient, GameClientHandle};
pub use config::ClientConfig;
pub use error::{JoinError, LocalPolicyViolation, ProtocolError, TransportError};
pub use protocol::{ClientIntent, ServerEvent};
pub use session::{SessionCredentials, SessionEvent, SessionManager};
pub use state::{GameState, Phase, Player};
