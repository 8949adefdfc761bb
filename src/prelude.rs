//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use ecs_core::prelude::*;
//! ```

pub use crate::app::{App, ConditionBuilder, ObserverBuilder, SystemBuilder, TagBuilder};
pub use crate::builtin::Name;
pub use crate::command::CommandBuffer;
pub use crate::component::{Bundle, Component};
pub use crate::entity::Entity;
pub use crate::error::{EcsError, Result};
pub use crate::plugin::Plugin;
pub use crate::query::{Query, Term};
pub use crate::schedule::{Schedule, TagGraph, TagId};
pub use crate::system::{
    Commands, DeltaTimeArg, EventReader, EventWriter, QueryArg, Res, ResMut, System, SystemAccess, SystemId,
};
pub use crate::time::{Arguments, DeltaTime, FixedTime, ShouldQuit, Time};
pub use crate::world::World;
