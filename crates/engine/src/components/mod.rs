//! Stock capability components.

pub mod evaluatable;
pub mod hyperparameters;
pub mod queryable;
pub mod trainable;
pub mod updatable;

pub use evaluatable::{Evaluatable, Evaluator};
pub use hyperparameters::{
    DynamicHyperparameters, HyperparameterKey, HyperparameterValue, OpenHyperparameters,
};
pub use queryable::{QueryHandler, Queryable};
pub use trainable::{TRAINING_STOPPED, Trainable, Trainer};
pub use updatable::{Updatable, Updater};
