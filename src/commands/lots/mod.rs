pub mod update_lot_command;

pub use update_lot_command::UpdateLotCommand;
