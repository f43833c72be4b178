//! Logistic-regression training on CKKS-encrypted data.
//!
//! Features, labels and weights stay encrypted while the compute side runs
//! gradient descent with rotations, selection masks and a polynomial sigmoid.
//! The only decryption happens in [`TrustedRefresher`], which resets the
//! depth budget once per iteration.

pub mod backend;
pub mod config;
pub mod dataset;
pub mod encoding;
pub mod errors;
pub mod linalg;
pub mod math;
pub mod observer;
pub mod packing;
pub mod params;
pub mod poly;
pub mod precision;
pub mod reference;
pub mod sigmoid;
pub mod trainer;

pub use backend::{
    CkksBackend, EvalContext, EvaluationKeys, KeySet, Leveled, SimulatedCkks,
    nearest_power_of_two,
};
pub use config::{TrainingConfig, TrainingConfigBuilder};
pub use dataset::{Dataset, DatasetError};
pub use errors::{CkksError, CkksResult, ErrorKind};
pub use observer::{EventLog, NoopObserver, TracingObserver, TrainingObserver};
pub use packing::{DiagonalPacking, MatrixPacking, RowPacking};
pub use params::{CkksParams, CkksParamsBuilder};
pub use poly::{EvaluationStrategy, Polynomial};
pub use reference::PlaintextTrainer;
pub use sigmoid::{SigmoidApproximator, SigmoidDegree};
pub use trainer::{
    EncryptedDataset, GradientDescentTrainer, Stage, TrainingError, TrustedRefresher,
};
