pub mod actor;
pub mod directory;
pub mod error;
pub mod module;
pub mod notify;
pub mod outbox;
pub mod types;

pub use actor::{Actor, Role};
pub use directory::{Directory, Person, StaticDirectory};
pub use error::ServiceError;
pub use module::Module;
pub use notify::{LogNotifier, Notice, Notifier};
pub use outbox::Outbox;
pub use types::{ListParams, ListResult, new_id, now_rfc3339};
