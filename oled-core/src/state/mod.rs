pub mod phase;
mod reconnect;

pub use phase::LinkPhase;
pub use reconnect::ReconnectSchedule;
