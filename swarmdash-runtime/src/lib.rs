pub mod bus;
pub mod coordinator;
pub mod runtime;
pub mod server;
pub mod store;
pub mod upstream;

mod error;

pub use crate::bus::EventBus;
pub use crate::coordinator::Coordinator;
pub use crate::error::{CoordinatorError, RuntimeError};
pub use crate::runtime::DashboardRuntime;
pub use crate::store::RunStore;
pub use crate::upstream::{LoadEngine, LocustClient, MetricsProxy, UpstreamError};
