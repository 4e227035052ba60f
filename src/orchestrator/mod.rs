//! Stack lifecycle orchestration: API contract, runner, trail, scripted API.

pub mod api;
pub mod runner;
pub mod scripted;
pub mod trail;

pub use api::{OrchestrationApi, RemoteStatus, StackAction, StackRequest};
pub use runner::{run, BuildStatus, OutputValue, RunOptions, RunResult};
pub use trail::{RunState, Trail, TrailEvent, TrailRecord};
