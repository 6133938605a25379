use crate::component::{check_required_axes, Component, Phase};
use crate::config::TimingConfig;
use crate::data::Data;
use crate::errors::{EcosimError, EcosimResult};
use crate::io::DataSink;
use crate::scheduler::Schedule;
use crate::variable::VariableRegistry;
use tracing::{debug, info, warn};

/// A set of components run in a fixed order over a shared data store.
///
/// Created by [`super::SimulationBuilder`]. The schedule, registry and component set are fixed
/// for the lifetime of the simulation; only the data store and the components' own state
/// change as it runs.
#[derive(Debug)]
pub struct Simulation {
    components: Vec<Box<dyn Component>>,
    registry: VariableRegistry,
    schedule: Schedule,
    data: Data,
    timing: TimingConfig,
    n_updates: usize,
    time_index: usize,
    initialised: bool,
    /// Time index of the update that failed, after which no further steps are taken
    failed_at: Option<usize>,
}

impl Simulation {
    pub(super) fn new(
        components: Vec<Box<dyn Component>>,
        registry: VariableRegistry,
        schedule: Schedule,
        data: Data,
        timing: TimingConfig,
    ) -> Self {
        let n_updates = timing.n_updates();
        Self {
            components,
            registry,
            schedule,
            data,
            timing,
            n_updates,
            time_index: 0,
            initialised: false,
            failed_at: None,
        }
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    /// Index of the next update to run
    pub fn time_index(&self) -> usize {
        self.time_index
    }

    /// Elapsed simulated time at the start of the next update
    pub fn current_time(&self) -> f64 {
        self.time_index as f64 * self.timing.update_interval
    }

    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    pub fn initialised(&self) -> bool {
        self.initialised
    }

    /// Whether every update has been run
    pub fn finished(&self) -> bool {
        self.time_index >= self.n_updates
    }

    /// Whether an update has failed
    pub fn failed(&self) -> bool {
        self.failed_at.is_some()
    }

    fn check_usable(&self) -> EcosimResult<()> {
        match self.failed_at {
            Some(time_index) => Err(EcosimError::SimulationFailed(time_index)),
            None => Ok(()),
        }
    }

    fn fail(&mut self, index: usize, phase: Phase, err: EcosimError) -> EcosimError {
        let component = self.components[index].name().to_string();
        warn!(
            component = %component,
            phase = %phase,
            time_index = self.time_index,
            error = %err,
            "Component failed, halting simulation"
        );
        self.failed_at = Some(self.time_index);
        EcosimError::ComponentFailure {
            component,
            phase: phase.to_string(),
            time_index: self.time_index,
            source: Box::new(err),
        }
    }

    /// Run every component's `init` in init order
    pub fn initialise(&mut self) -> EcosimResult<()> {
        self.check_usable()?;
        if self.initialised {
            return Err(EcosimError::Error(
                "simulation has already been initialised".to_string(),
            ));
        }

        for index in self.schedule.order(Phase::Init).to_vec() {
            let component = &mut self.components[index];
            let result = check_required_axes(&**component, Phase::Init, &self.data)
                .and_then(|_| component.init(&mut self.data));
            if let Err(err) = result {
                return Err(self.fail(index, Phase::Init, err));
            }
        }

        self.initialised = true;
        info!(
            n_components = self.components.len(),
            n_updates = self.n_updates,
            "Simulation initialised"
        );
        Ok(())
    }

    /// Run every component's `update` for the current time index
    ///
    /// The simulation must have been initialised. If any update fails the simulation is
    /// halted and every later call returns [`EcosimError::SimulationFailed`].
    pub fn step(&mut self) -> EcosimResult<()> {
        self.check_usable()?;
        if !self.initialised {
            return Err(EcosimError::Error(
                "simulation must be initialised before stepping".to_string(),
            ));
        }
        if self.finished() {
            return Err(EcosimError::Error(format!(
                "simulation has finished all {} updates",
                self.n_updates
            )));
        }

        for index in self.schedule.order(Phase::Update).to_vec() {
            let component = &mut self.components[index];
            let result = check_required_axes(&**component, Phase::Update, &self.data)
                .and_then(|_| component.update(&mut self.data, self.time_index));
            if let Err(err) = result {
                return Err(self.fail(index, Phase::Update, err));
            }
        }

        debug!(time_index = self.time_index, "Completed update");
        self.time_index += 1;
        Ok(())
    }

    /// Initialise if needed and run the remaining updates
    pub fn run(&mut self) -> EcosimResult<()> {
        if !self.initialised {
            self.initialise()?;
        }
        while !self.finished() {
            self.step()?;
        }
        info!(n_updates = self.n_updates, "Simulation finished");
        Ok(())
    }

    /// Write a snapshot of the data store to a sink
    ///
    /// Allowed after a failure, so that the state at the point of failure can be inspected.
    pub fn checkpoint(&self, names: Option<&[&str]>, sink: &mut dyn DataSink) -> EcosimResult<()> {
        self.data.export(names, sink)
    }

    /// Call every component's `cleanup`, reporting all failures together
    pub fn cleanup(&mut self) -> EcosimResult<()> {
        let errors: Vec<EcosimError> = self
            .components
            .iter_mut()
            .filter_map(|component| {
                component.cleanup().err().map(|err| EcosimError::ComponentFailure {
                    component: component.name().to_string(),
                    phase: "cleanup".to_string(),
                    time_index: self.time_index,
                    source: Box::new(err),
                })
            })
            .collect();

        match EcosimError::batch(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Graphviz rendering of the component dependencies for a phase
    pub fn as_dot(&self, phase: Phase) -> String {
        self.schedule.as_dot(phase)
    }
}
