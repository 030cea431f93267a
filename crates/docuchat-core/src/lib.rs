pub mod config;
pub mod error;
pub mod events;
pub mod timer;
pub mod types;

pub use config::DocuchatConfig;
pub use error::{DocuchatError, Result};
pub use events::{EventBus, SessionEvent};
pub use timer::{spawn_ticker, TickControl, TickerHandle};
pub use types::*;
