pub mod callback;
pub mod proxy_granting_ticket;
pub mod proxy_ticket;
pub mod service_ticket;
pub mod ticket;
