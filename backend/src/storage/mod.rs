pub mod db_manager;
pub mod send_recorder;

pub use db_manager::DbManager;
pub use send_recorder::SqliteSendRecorder;
