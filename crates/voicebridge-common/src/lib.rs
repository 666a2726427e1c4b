pub mod errors;
pub mod events;
pub mod id;

pub use errors::{BridgeError, ConfigError, PlatformError, RegistryError};
pub use events::{BridgeEvent, CueKind, EventBus};
pub use id::{new_correlation_id, ChannelId, GroupId, UserId};

pub type Result<T> = std::result::Result<T, BridgeError>;
