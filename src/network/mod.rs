pub mod hosts;
pub mod topology;

pub use hosts::{Host, HostTracker, Learned};
pub use topology::Topology;
