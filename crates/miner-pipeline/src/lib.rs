//! Strategy chain engine.
//!
//! A run is an ordered list of [`Strategy`] instances built by a
//! [`StrategyFactory`] from PVL `Object = Strategy` definitions. Each strategy
//! filters, annotates, sorts, pairs or exports the shared record set in turn;
//! [`MinerRunner`] drives the list and reports per-step counts.

pub mod calculator;
pub mod gis;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod strategies;
pub mod strategy;

pub use calculator::{format_number, Calculator, ResourcePool, VariablePool};
pub use gis::{EnvelopeFactory, EnvelopeGeometry, EnvelopeIndex};
pub use progress::Progress;
pub use registry::{
    default_registry, parameters_resource, PluginLibrary, StrategyConstructor, StrategyFactory,
    StrategyRegistry,
};
pub use runner::{apply_all, MinerRunner, RunReport, StepReport};
pub use strategy::{
    apply_to_intersected_geometry, apply_to_resources, get_globals, process_args,
    InvalidGeometryAction, Strategy, StrategyCore,
};
