pub mod db;
pub mod mailer;
pub mod memory;

pub use db::DbAdapter;
pub use mailer::LogMailer;
pub use memory::MemoryStore;
