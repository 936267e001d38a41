// sb-client - HTTP requester for swiftbench workers
//
// One persistent HTTP/1.1 connection per loop task, or one multiplexed
// HTTP/2 connection shared by all tasks of a worker

pub mod client;
pub mod h2c;
pub mod wire;

// Re-export for convenience
pub use client::{HttpClient, Http1Connection, RequestError, RequestTemplate, Response};
pub use h2c::H2Channel;
