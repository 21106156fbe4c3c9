pub mod agent;
pub mod aggregator;
pub mod analysts;
pub mod calibration;
pub mod claude_cli;
pub mod data_source;
pub mod dispatcher;
pub mod error;
pub mod narrator;
pub mod position;
pub mod prompts;

pub mod test_support;

pub use agent::{Agent, AgentRegistry, RegisteredAgent};
pub use aggregator::{aggregate, SignalAggregator};
pub use calibration::{Calibration, CalibrationThresholds, Calibrator, Evidence, Vote};
pub use data_source::{DataSource, StaticDataSource};
pub use dispatcher::{DispatchOutcome, DispatchSettings, Dispatcher, NoopSink, ProgressSink};
pub use error::{AgentError, AggregationError, PositionError};
pub use narrator::TextGenerator;
pub use position::PositionDecisionEngine;
