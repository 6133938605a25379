use thiserror::Error;

/// The specific reason an array could not be mapped onto a canonical axis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },
    #[error("point {point} at ({x}, {y}) is claimed by cells {cells:?} on their shared boundary")]
    AmbiguousCoordinate {
        point: usize,
        x: f64,
        y: f64,
        cells: Vec<usize>,
    },
    #[error("cell {cell} is covered by more than one point: {points:?}")]
    DuplicateCoverage { cell: usize, points: Vec<usize> },
    #[error("cells {cells:?} have no mapped point")]
    MissingCoverage { cells: Vec<usize> },
    #[error("points {points:?} fall outside every grid cell")]
    OutOfGrid { points: Vec<usize> },
    #[error("cell_id values {ids:?} appear more than once")]
    DuplicateCellId { ids: Vec<i64> },
    #[error("cell_id values {ids:?} are not cells of the grid")]
    UnknownCellId { ids: Vec<i64> },
    #[error("cell_id coordinate value {value} is not an integer")]
    NonIntegralCellId { value: f64 },
}

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum EcosimError {
    #[error("{0}")]
    Error(String),
    #[error("Invalid grid configuration: {0}")]
    InvalidGrid(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error(
        "Validation of variable '{variable}' on the {axis} axis failed in validator '{validator}': {failure}"
    )]
    Validation {
        variable: String,
        axis: String,
        validator: String,
        failure: ValidationFailure,
    },
    #[error(
        "Variable '{variable}' matches several validators on the {axis} axis: {validators:?}"
    )]
    AmbiguousValidators {
        variable: String,
        axis: String,
        validators: Vec<String>,
    },
    #[error("No {kind} named '{name}'")]
    NotFound { kind: String, name: String },
    #[error("Variable '{variable}' is {role} by both '{first}' and '{second}' during {phase}")]
    DuplicateDefinition {
        variable: String,
        role: String,
        phase: String,
        first: String,
        second: String,
    },
    #[error("Components reference variables missing from the variable definitions: {}", .0.join("; "))]
    UndefinedVariables(Vec<String>),
    #[error("Unsatisfiable requirements: {}", .0.join("; "))]
    UnsatisfiedRequirements(Vec<String>),
    #[error(
        "Cyclic dependency during {phase} between components {components:?} over variable '{variable}'"
    )]
    CyclicDependency {
        phase: String,
        components: Vec<String>,
        variable: String,
    },
    #[error("Failed to load {} variable(s): {}", .0.len(), format_batch(.0))]
    LoadFailures(Vec<(String, EcosimError)>),
    #[error("{} errors: {}", .0.len(), .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<EcosimError>),
    #[error("Component '{component}' failed during {phase} at time index {time_index}: {source}")]
    ComponentFailure {
        component: String,
        phase: String,
        time_index: usize,
        #[source]
        source: Box<EcosimError>,
    },
    #[error("Simulation halted after a failed update at time index {0}; state is no longer consistent")]
    SimulationFailed(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl EcosimError {
    pub(crate) fn not_found(kind: &str, name: impl Into<String>) -> Self {
        EcosimError::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Collapse a batch of errors, keeping a lone error unwrapped.
    pub(crate) fn batch(mut errors: Vec<EcosimError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(EcosimError::Multiple(errors)),
        }
    }
}

fn format_batch(errors: &[(String, EcosimError)]) -> String {
    errors
        .iter()
        .map(|(name, err)| format!("'{name}': {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience type for `Result<T, EcosimError>`.
pub type EcosimResult<T> = Result<T, EcosimError>;
