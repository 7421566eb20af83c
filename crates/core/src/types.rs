/// Seed value for the sampler. [`RANDOM_SEED`] asks the engine to pick one.
pub type Seed = i64;

/// Conventional "choose randomly" seed value.
pub const RANDOM_SEED: Seed = -1;
