mod repository;
mod schema;
mod session;

pub use repository::Repository;
pub use session::CycleSession;
