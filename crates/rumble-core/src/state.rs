//! Fighter records and the co-simulated match state.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fx, ONE};

/// Starting hit points for both fighters.
pub const START_HP: i32 = 100;

/// One player's simulation record. Created at seed time, mutated only by
/// the simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fighter {
    /// World x position, signed 16.16.
    pub x: Fx,
    /// Velocity per tick, signed 16.16.
    pub vx: Fx,
    /// Hit points, never below zero.
    pub hp: i32,
    /// Hash of the current animation name (zero until a script picks one).
    pub anim: i32,
}

impl Fighter {
    pub fn at(x: Fx) -> Self {
        Self {
            x,
            vx: 0,
            hp: START_HP,
            anim: 0,
        }
    }
}

/// Complete match state for one frame. Logically immutable once committed
/// to history; the simulation step produces the next frame's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Frame counter, wraps at 2^16.
    pub frame: u16,
    pub p1: Fighter,
    pub p2: Fighter,
}

impl GameState {
    /// Seed state: fighters one world unit either side of the origin,
    /// facing each other at full health.
    pub fn seed() -> Self {
        Self {
            frame: 0,
            p1: Fighter::at(-ONE),
            p2: Fighter::at(ONE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_places_fighters_symmetrically() {
        let s = GameState::seed();
        assert_eq!(s.frame, 0);
        assert_eq!(s.p1.x, -65536);
        assert_eq!(s.p2.x, 65536);
        assert_eq!(s.p1.vx, 0);
        assert_eq!(s.p2.vx, 0);
        assert_eq!(s.p1.hp, START_HP);
        assert_eq!(s.p1.anim, 0);
    }
}
