pub mod algorithms;
pub mod command_log;
pub mod config;
pub mod controller;
pub mod error;
pub mod event_server;
pub mod messages;
pub mod network;
pub mod packet;
pub mod rate_limit;
pub mod routing;
pub mod telemetry;

/// OpenFlow datapath identifier of a switch.
pub type Dpid = u64;

/// Physical port number on a switch.
pub type PortNo = u16;

pub use controller::Controller;
pub use config::ControllerConfig;
pub use messages::{ControllerEvent, FlowMatch, FlowRule, OutputPort, SwitchCommand};
