mod coord;
mod ids;
mod intent;
mod records;
mod update;
pub mod wire;

pub use crate::coord::*;
pub use crate::ids::*;
pub use crate::intent::*;
pub use crate::records::*;
pub use crate::update::*;
