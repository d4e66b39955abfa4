mod room;
mod room_command;
mod room_manager;
mod transitions;

pub use room::*;
pub use room_command::*;
pub use room_manager::*;
