//! Variable registry
//!
//! Every variable a simulation may use is declared up front in a listing, usually a TOML file:
//!
//! ```toml
//! [[variable]]
//! name = "soil_moisture"
//! description = "Volumetric soil moisture"
//! unit = "m3 m-3"
//! variable_type = "float"
//! axis = ["spatial"]
//! ```
//!
//! The listing is loaded with [`VariableRegistry::from_toml`] and then the selected components
//! are registered against it with [`VariableRegistry::register_components`], recording which
//! component populates and which components require each variable in each phase. The
//! registry is read-only once built.

use crate::axis::CoreAxis;
use crate::component::{Component, Phase, Role};
use crate::errors::{EcosimError, EcosimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Definition of a variable from the listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_variable_type")]
    pub variable_type: String,
    /// Canonical axes the variable is defined on
    #[serde(default)]
    pub axis: Vec<CoreAxis>,
}

fn default_variable_type() -> String {
    "float".to_string()
}

impl VariableDefinition {
    pub fn new(name: &str, description: &str, unit: &str, axis: &[CoreAxis]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            unit: unit.to_string(),
            variable_type: default_variable_type(),
            axis: axis.to_vec(),
        }
    }
}

/// Which components use a variable, and how
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populated_by_init: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populated_by_update: Option<String>,
    #[serde(default)]
    pub required_by_init: Vec<String>,
    #[serde(default)]
    pub required_by_update: Vec<String>,
}

impl VariableUsage {
    pub fn populated_by(&self, phase: Phase) -> Option<&str> {
        match phase {
            Phase::Init => self.populated_by_init.as_deref(),
            Phase::Update => self.populated_by_update.as_deref(),
        }
    }

    pub fn required_by(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Init => &self.required_by_init,
            Phase::Update => &self.required_by_update,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VariableListing {
    #[serde(default)]
    variable: Vec<VariableDefinition>,
}

#[derive(Debug, Serialize)]
struct RegistryEntry<'a> {
    #[serde(flatten)]
    definition: &'a VariableDefinition,
    #[serde(flatten)]
    usage: &'a VariableUsage,
}

#[derive(Debug, Serialize)]
struct RegistryListing<'a> {
    variable: Vec<RegistryEntry<'a>>,
}

/// Catalogue of known variables and the components that use them
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    definitions: BTreeMap<String, VariableDefinition>,
    usage: BTreeMap<String, VariableUsage>,
}

impl VariableRegistry {
    /// Build a registry from variable definitions
    ///
    /// Fails if a name is defined more than once.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = VariableDefinition>,
    ) -> EcosimResult<Self> {
        let mut registry = Self::default();
        let mut repeated = Vec::new();

        for definition in definitions {
            if registry.definitions.contains_key(&definition.name) {
                repeated.push(definition.name.clone());
                continue;
            }
            registry
                .usage
                .insert(definition.name.clone(), VariableUsage::default());
            registry
                .definitions
                .insert(definition.name.clone(), definition);
        }

        if !repeated.is_empty() {
            return Err(EcosimError::Configuration(format!(
                "variables defined more than once: {}",
                repeated.join(", ")
            )));
        }
        Ok(registry)
    }

    /// Build a registry from a TOML listing of `[[variable]]` tables
    pub fn from_toml(listing: &str) -> EcosimResult<Self> {
        let listing: VariableListing = toml::from_str(listing)?;
        Self::from_definitions(listing.variable)
    }

    /// Serialise the registry, including recorded usage, as a TOML listing
    pub fn to_toml(&self) -> EcosimResult<String> {
        let listing = RegistryListing {
            variable: self
                .definitions
                .iter()
                .filter_map(|(name, definition)| {
                    self.usage
                        .get(name)
                        .map(|usage| RegistryEntry { definition, usage })
                })
                .collect(),
        };
        Ok(toml::to_string(&listing)?)
    }

    /// Record the declared requirements of the selected components
    ///
    /// Every referenced variable must be in the listing and at most one component may populate
    /// a variable in each phase. All problems are reported together and the registry is left
    /// unchanged if there are any.
    pub fn register_components(&mut self, components: &[Box<dyn Component>]) -> EcosimResult<()> {
        let mut usage = self.usage.clone();
        let mut undefined = Vec::new();
        let mut errors = Vec::new();

        for component in components {
            let component_name = component.name();
            for requirement in component.definitions() {
                let Some(entry) = usage.get_mut(&requirement.name) else {
                    undefined.push(format!(
                        "'{}' ({} by '{}' during {})",
                        requirement.name, requirement.role, component_name, requirement.phase
                    ));
                    continue;
                };

                match requirement.role {
                    Role::Populated => {
                        let slot = match requirement.phase {
                            Phase::Init => &mut entry.populated_by_init,
                            Phase::Update => &mut entry.populated_by_update,
                        };
                        match slot.as_deref() {
                            Some(existing) if existing != component_name => {
                                errors.push(EcosimError::DuplicateDefinition {
                                    variable: requirement.name.clone(),
                                    role: requirement.role.to_string(),
                                    phase: requirement.phase.to_string(),
                                    first: existing.to_string(),
                                    second: component_name.to_string(),
                                });
                            }
                            Some(_) => {}
                            None => *slot = Some(component_name.to_string()),
                        }
                    }
                    Role::Required => {
                        let users = match requirement.phase {
                            Phase::Init => &mut entry.required_by_init,
                            Phase::Update => &mut entry.required_by_update,
                        };
                        if !users.iter().any(|u| u == component_name) {
                            users.push(component_name.to_string());
                        }
                    }
                }
            }
            debug!(component = component_name, "Registered component variables");
        }

        if !undefined.is_empty() {
            errors.insert(0, EcosimError::UndefinedVariables(undefined));
        }
        if let Some(err) = EcosimError::batch(errors) {
            return Err(err);
        }
        self.usage = usage;
        Ok(())
    }

    pub fn get(&self, name: &str) -> EcosimResult<&VariableDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| EcosimError::not_found("variable definition", name))
    }

    pub fn usage(&self, name: &str) -> Option<&VariableUsage> {
        self.usage.get(name)
    }

    /// The component populating a variable in a phase, if any
    pub fn populated_by(&self, name: &str, phase: Phase) -> Option<&str> {
        self.usage.get(name).and_then(|u| u.populated_by(phase))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
