// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archetype ECS - a relational, reflection-driven entity component
//! system core for voxel game engines.
//!
//! Entities, components and relations live in dense archetype tables
//! addressed through type-erased descriptors, so the crate itself never
//! needs to know a game's concrete component types. A term-based query
//! engine matches and joins across those tables (including relation
//! traversal), a tag-ordered scheduler packs systems into conflict-free
//! parallel layers, and an `App`/`Plugin` builder wires both together
//! into a runnable frame loop.

pub mod any_value;
pub mod app;
pub mod archetype;
pub mod bitset;
pub mod blueprint;
pub mod builtin;
pub mod command;
pub mod component;
pub mod dependency;
pub mod entity;
pub mod error;
pub mod event;
pub mod executor;
pub mod observer;
pub mod plugin;
pub mod prelude;
pub mod query;
pub mod reflection;
pub mod relation;
pub mod schedule;
pub mod system;
pub mod table;
pub mod time;
pub mod types;
pub mod utils;
pub mod world;

pub use app::App;
pub use command::CommandBuffer;
pub use component::{Bundle, Component};
pub use entity::Entity;
pub use error::{EcsError, Result};
pub use executor::SystemProfiler;
pub use plugin::Plugin;
pub use query::{Query, Term};
pub use schedule::{Schedule, TagGraph, TagId};
pub use system::{BoxedSystem, System, SystemAccess, SystemId};
pub use world::World;
