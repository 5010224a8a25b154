mod gate;
mod handler;
mod observer;

pub use gate::{AllowList, DemoPasswordGate};
pub use handler::start_proxy_server;
