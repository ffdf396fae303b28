pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod kernel;
pub mod platform;
pub mod services;
pub mod vision;

pub use config::LiveConfig;
pub use error::{LiveError, Result};
pub use kernel::reactor::SessionController;
pub use kernel::state::LiveState;
