mod proxy_granting_ticket;
mod proxy_ticket;
mod service_ticket;

pub use proxy_granting_ticket::*;
pub use proxy_ticket::*;
pub use service_ticket::*;
