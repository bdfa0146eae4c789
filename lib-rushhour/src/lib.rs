#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

#[macro_use]
pub mod helpers;
pub mod dispatch;
pub mod event;
pub mod population;
pub mod rate;
pub mod sampler;

pub use dispatch::Sink;
pub use population::WeightDistribution;
