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

//! Error types.
//!
//! `SetupError`/`AccessConflict` are fatal: they abort `App::run` before any
//! system executes. `InvalidEntity`/`MissingTrait`/`InvalidHandle` are
//! returned to the call site, which is expected to log and continue rather
//! than propagate them through a frame.

use std::fmt;

use crate::entity::Entity;

#[derive(Debug, Clone)]
pub enum EcsError {
    /// Entity not found or dead.
    EntityNotFound,
    /// Component not found on an otherwise-valid entity.
    ComponentNotFound,
    /// Archetype not found.
    ArchetypeNotFound,
    /// Operation referenced a destroyed or never-created entity.
    InvalidEntity(Entity),
    /// Dereferencing a null or stale resource handle.
    InvalidHandle(String),
    /// Setup-time failure: duplicate type name, missing plugin dependency,
    /// cyclic tag graph, cyclic inheritance.
    SetupError(String),
    /// Two systems cannot be scheduled without a data race, and no
    /// ordering constraint resolves it.
    AccessConflict(String),
    /// A runtime-generic operation needs a trait the descriptor lacks.
    MissingTrait(String),
    /// Blueprint/scene JSON parse or instantiation failure.
    FormatError(String),
    /// Command buffer replay error.
    CommandError(String),
    /// System dependency cycle detected.
    SystemCycleDetected,
    /// Schedule compilation error.
    ScheduleError(String),
    /// System not found in the registry.
    SystemNotFound,
    /// Event queue overflow.
    EventQueueOverflow,
    /// Resource not found.
    ResourceNotFound(String),
    /// Resource already exists (`insert_resource` on an occupied slot is
    /// not itself an error — this is for `register_resource` collisions).
    ResourceAlreadyExists(String),
    /// Batch size too large (possible DoS attempt).
    BatchTooLarge,
    /// Spawn error with detailed context.
    SpawnError(SpawnError),
}

#[derive(Debug, Clone)]
pub enum SpawnError {
    EntityCapacityExhausted { attempted: usize, capacity: usize },
    ComponentRegistrationFailed(String),
    ArchetypeCreationFailed { component_count: usize, reason: String },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::EntityCapacityExhausted { attempted, capacity } => {
                write!(f, "entity capacity exhausted: attempted to spawn {attempted}, max is {capacity}")
            }
            SpawnError::ComponentRegistrationFailed(reason) => {
                write!(f, "failed to register component: {reason}")
            }
            SpawnError::ArchetypeCreationFailed { component_count, reason } => {
                write!(f, "failed to create archetype for {component_count} components: {reason}")
            }
        }
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound => write!(f, "entity not found"),
            EcsError::ComponentNotFound => write!(f, "component not found"),
            EcsError::ArchetypeNotFound => write!(f, "archetype not found"),
            EcsError::InvalidEntity(e) => write!(f, "invalid entity: {e:?}"),
            EcsError::InvalidHandle(msg) => write!(f, "invalid handle: {msg}"),
            EcsError::SetupError(msg) => write!(f, "setup error: {msg}"),
            EcsError::AccessConflict(msg) => write!(f, "access conflict: {msg}"),
            EcsError::MissingTrait(msg) => write!(f, "missing trait: {msg}"),
            EcsError::FormatError(msg) => write!(f, "format error: {msg}"),
            EcsError::CommandError(msg) => write!(f, "command error: {msg}"),
            EcsError::SystemCycleDetected => write!(f, "system dependency cycle detected"),
            EcsError::ScheduleError(msg) => write!(f, "schedule error: {msg}"),
            EcsError::SystemNotFound => write!(f, "system not found"),
            EcsError::EventQueueOverflow => write!(f, "event queue overflow"),
            EcsError::ResourceNotFound(msg) => write!(f, "resource not found: {msg}"),
            EcsError::ResourceAlreadyExists(msg) => write!(f, "resource already exists: {msg}"),
            EcsError::BatchTooLarge => write!(f, "batch size too large (max 10,000,000)"),
            EcsError::SpawnError(e) => write!(f, "spawn error: {e}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<SpawnError> for EcsError {
    fn from(err: SpawnError) -> Self {
        EcsError::SpawnError(err)
    }
}

/// Logs a fatal setup error via `tracing` and returns it. Setup errors
/// always abort before the first system runs, so every call site goes
/// through here rather than constructing `EcsError::SetupError` directly.
pub fn setup_error<T>(msg: impl Into<String>) -> Result<T> {
    let msg = msg.into();
    tracing::error!(error = %msg, "setup error");
    Err(EcsError::SetupError(msg))
}

/// Logs a non-fatal runtime error at the call site that is about to
/// suppress it, per the propagation policy in §7: per-entity operations
/// on stale/missing data are logged and swallowed rather than aborting
/// the frame.
pub fn log_suppressed(err: &EcsError) {
    tracing::warn!(error = %err, "suppressed runtime error");
}

pub type Result<T> = std::result::Result<T, EcsError>;
</content>
