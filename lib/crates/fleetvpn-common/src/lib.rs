pub mod config;
pub mod error;
pub mod process;
pub mod protocol;
pub mod result;
pub mod types;

pub use config::AgentConfig;
pub use error::{ProcessError, ProtocolError, ValidationError};
pub use process::{CommandRunner, ProcessSpec, StreamedOutput, TokioCommandRunner};
pub use protocol::{
    AgentCommand, AgentRequest, AuthorizeKeyParams, ClientParams, CommandName, ConfigureParams,
    CreateClientParams, StunnelParams, validate_host,
};
pub use result::{
    AgentErrorCode, AgentResult, AuthorizedKey, ClientListing, Connection, CreatedClient,
    ReinstallOutcome, ServiceStatus, TrafficStats,
};
pub use types::*;
