mod consultation;
mod expense;
mod money;
mod sequence;
mod settlement;

pub use consultation::*;
pub use expense::*;
pub use money::*;
pub use sequence::*;
pub use settlement::*;
