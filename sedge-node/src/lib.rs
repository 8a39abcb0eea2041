//! Sparkplug edge node core.
//!
//! A node owns a [MetricStore] of aliased, typed metrics, routes inbound
//! commands with the [CommandRouter], and drives births and deaths through the
//! [LifecycleController] while the [LwtCoordinator] keeps the broker-held will
//! in step with the bdSeq counter. [Session] ties these together and the
//! [NodeAgent] connects a session to a transport.

mod agent;
mod builder;
mod error;
mod lifecycle;
mod lwt;
mod metric;
mod outbound;
mod router;
mod session;

pub use agent::{NodeAgent, NodeHandle, TelemetrySource};
pub use builder::NodeAgentBuilder;
pub use error::{CommandError, DeviceError, MetricError};
pub use lifecycle::{BirthState, LifecycleController};
pub use lwt::LwtCoordinator;
pub use metric::{ChangeNotifier, Metric, MetricDetails, MetricHandle, MetricStore};
pub use outbound::Outbound;
pub use router::{CommandMetric, CommandRouter, NodeCommand, RouteAction};
pub use session::{CommandHandler, CommandHandlers, Session};
