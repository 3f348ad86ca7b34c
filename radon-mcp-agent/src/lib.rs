pub mod server;
pub mod utils;

pub use server::render_logs_response;
pub use utils::ServerWrapper;
