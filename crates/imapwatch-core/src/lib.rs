mod model;
mod stop;

pub use model::*;
pub use stop::StopSignal;
