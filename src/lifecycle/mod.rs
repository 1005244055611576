//! Process lifecycle: shutdown signals and configuration reload

mod reload;
mod shutdown;

pub use reload::ConfigReloader;
pub use shutdown::ShutdownSignal;
