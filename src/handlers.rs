mod import_handlers;
mod transactions_handlers;

pub use import_handlers::*;
pub use transactions_handlers::*;
