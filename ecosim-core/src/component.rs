//! The contract between the simulation kernel and science components
//!
//! A component declares, through [`Component::definitions`], which variables it reads and
//! writes during each [`Phase`]. The kernel uses those declarations to build the variable
//! registry and to order components, and never looks inside a component otherwise.
//!
//! Components are registered with `typetag` so that the set of available components is open
//! and a simulation can be configured from a file:
//!
//! ```toml
//! [[components]]
//! type = "Evaporation"
//! rate = 0.1
//! ```

use crate::axis::CoreAxis;
use crate::data::Data;
use crate::errors::{EcosimError, EcosimResult};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// When a requirement applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Once, before the first update
    Init,
    /// Every time step
    Update,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Update => write!(f, "update"),
        }
    }
}

/// Whether a component reads or writes a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Required,
    Populated,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Required => write!(f, "required"),
            Role::Populated => write!(f, "populated"),
        }
    }
}

/// A single declared use of a variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDefinition {
    pub name: String,
    pub phase: Phase,
    pub role: Role,
    /// Axes the variable must have been validated onto before the component runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub axes: Vec<CoreAxis>,
}

impl RequirementDefinition {
    pub fn new(name: &str, phase: Phase, role: Role) -> Self {
        Self {
            name: name.to_string(),
            phase,
            role,
            axes: vec![],
        }
    }

    pub fn required(name: &str, phase: Phase) -> Self {
        Self::new(name, phase, Role::Required)
    }

    pub fn populated(name: &str, phase: Phase) -> Self {
        Self::new(name, phase, Role::Populated)
    }

    pub fn on_axes(mut self, axes: &[CoreAxis]) -> Self {
        self.axes = axes.to_vec();
        self
    }
}

/// A science component driven by the simulation
#[typetag::serde(tag = "type")]
pub trait Component: Debug + Send + Sync {
    /// Name used in schedules and error messages; unique within a simulation
    fn name(&self) -> &str;

    fn definitions(&self) -> Vec<RequirementDefinition>;

    /// Variables read by [`Component::init`]
    fn required_init_vars(&self) -> Vec<RequirementDefinition> {
        self.requirements(Phase::Init, Role::Required)
    }

    /// Variables read by [`Component::update`]
    fn required_update_vars(&self) -> Vec<RequirementDefinition> {
        self.requirements(Phase::Update, Role::Required)
    }

    /// Variables written by [`Component::init`]
    fn vars_populated_by_init(&self) -> Vec<String> {
        self.requirements(Phase::Init, Role::Populated)
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    /// Variables written by [`Component::update`]
    fn vars_updated(&self) -> Vec<String> {
        self.requirements(Phase::Update, Role::Populated)
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    fn requirements(&self, phase: Phase, role: Role) -> Vec<RequirementDefinition> {
        self.definitions()
            .into_iter()
            .filter(|r| r.phase == phase && r.role == role)
            .collect()
    }

    fn init(&mut self, data: &mut Data) -> EcosimResult<()>;

    fn update(&mut self, data: &mut Data, time_index: usize) -> EcosimResult<()>;

    /// Release any resources once the simulation is finished
    fn cleanup(&mut self) -> EcosimResult<()> {
        Ok(())
    }
}

/// Check that the variables a component reads in a phase are on the axes it declared
pub fn check_required_axes(
    component: &dyn Component,
    phase: Phase,
    data: &Data,
) -> EcosimResult<()> {
    let problems: Vec<String> = component
        .requirements(phase, Role::Required)
        .iter()
        .flat_map(|requirement| {
            requirement
                .axes
                .iter()
                .filter(|axis| !data.on_axis(&requirement.name, **axis))
                .map(move |axis| {
                    format!(
                        "'{}' requires '{}' on the {} axis during {}",
                        component.name(),
                        requirement.name,
                        axis,
                        phase
                    )
                })
        })
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(EcosimError::UnsatisfiedRequirements(problems))
    }
}
