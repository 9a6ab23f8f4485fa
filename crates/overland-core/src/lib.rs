mod combat;
mod entities;
mod error;
mod game;
mod map;
mod memory;
pub mod movement;
mod replication;
mod rules;
mod settlement;
mod unit;
pub mod visibility;
mod world;

pub use crate::combat::*;
pub use crate::entities::*;
pub use crate::error::*;
pub use crate::game::*;
pub use crate::map::*;
pub use crate::memory::*;
pub use crate::movement::{
    compute_combat_reachability, compute_reachability, Budget, ReachCell, Reachability,
    ReachabilityGrid, StackProfile, TerrainKnowledge,
};
pub use crate::replication::*;
pub use crate::rules::*;
pub use crate::settlement::*;
pub use crate::unit::*;
pub use crate::world::*;
