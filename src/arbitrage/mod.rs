pub mod evaluator;
pub mod finder;
pub mod graph;
pub mod ranker;
pub mod types;

pub use evaluator::{evaluate, evaluate_all, fee_multiplier};
pub use finder::find_triangles;
pub use graph::PairGraph;
pub use ranker::{rank, retain_min_percent};
pub use types::ArbitrageConfig;
