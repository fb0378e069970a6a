pub mod codec;
pub mod config;
pub mod corpus;
pub mod error;
pub mod executor;
pub mod input;
pub mod logging;
pub mod mutator;
pub mod scheduler;
pub mod sink;

pub use codec::QueryParams;
pub use config::{EngineConfig, MatchReplaceRule, RuleFile, RuleSpec, RunOptions};
pub use corpus::{Normalizer, read_targets};
pub use error::{CodecError, ConfigError, EngineError, JobError};
pub use executor::{ExecutionStatus, MutationExecutor};
pub use input::{DedupKey, InputUrl};
pub use mutator::{InjectionListMutator, Mutator, RegexReplaceMutator, Strategy};
pub use scheduler::{Dispatcher, RunStats};
pub use sink::{ResultSink, VecSink, WriterSink};
