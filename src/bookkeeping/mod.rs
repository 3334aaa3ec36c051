pub mod superficial_loss;

pub use superficial_loss::{detect, SflAllocation, SflInput, SflResult, WindowAcquisition};
