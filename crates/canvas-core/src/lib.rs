pub mod abort;
pub mod blend;
pub mod config;
pub mod error;
pub mod events;
pub mod path;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod systems;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use blend::BlendMode;
pub use config::{CoreConfig, LedConfig, SchedulerConfig, WaypointConfig};
pub use error::{LinkError, MissionError, PathError, QueueOverflow, StateError, SystemError};
pub use events::EventBus;
pub use path::{Path, Waypoint};
pub use queue::{command_queue, CommandReceiver, CommandSender};
pub use scheduler::{Rate, Scheduler, System, TickContext};
pub use state::{SharedVehicleState, VehicleState};
