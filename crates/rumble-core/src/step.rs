//! One frame of co-simulation.
//!
//! Advance order is part of the protocol: player one steps first, then
//! player two. Both peers must interpret commands in the same order or
//! their fingerprints diverge.

use crate::fixed::WALK_SPEED;
use crate::hash::hash32;
use crate::input::button;
use crate::script::{Command, ScriptVm};
use crate::state::{Fighter, GameState};

/// Advance `s` by one frame using both players' masks and VMs. The frame
/// counter increments modulo 2^16.
pub fn advance<V: ScriptVm>(
    s: &mut GameState,
    input1: u16,
    input2: u16,
    vm1: &mut V,
    vm2: &mut V,
) {
    // The VM sees the unwrapped 32-bit successor of the 16-bit counter.
    let next = u32::from(s.frame) + 1;
    advance_fighter(&mut s.p1, vm1, next, input1);
    advance_fighter(&mut s.p2, vm2, next, input2);
    s.frame = next as u16;
}

fn advance_fighter<V: ScriptVm>(f: &mut Fighter, vm: &mut V, frame: u32, input: u16) {
    let commands = vm.tick(frame, u32::from(input));
    if commands.is_empty() {
        // Script error or a program that stays silent: map the input
        // directly to velocity so the match stays playable.
        f.vx = if input & button::LEFT != 0 {
            -WALK_SPEED
        } else if input & button::RIGHT != 0 {
            WALK_SPEED
        } else {
            0
        };
    } else {
        for cmd in commands {
            match cmd {
                Command::Move { dx } => {
                    f.vx = match dx {
                        d if d > 0 => WALK_SPEED,
                        d if d < 0 => -WALK_SPEED,
                        _ => 0,
                    };
                }
                Command::Anim { name } => {
                    f.anim = hash32(&name);
                }
            }
        }
    }
    f.x = f.x.wrapping_add(f.vx);
    if f.hp < 0 {
        f.hp = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::ONE;
    use crate::hash::hash32;

    /// Deterministic stand-in VM: maps left/right bits to move commands,
    /// optionally naming an animation, the way the reference walker script
    /// does.
    struct WalkerVm {
        with_anim: bool,
        silent: bool,
    }

    impl ScriptVm for WalkerVm {
        type Snapshot = ();

        fn load_source(&mut self, _src: &str) -> bool {
            true
        }

        fn take_last_error(&mut self) -> Option<String> {
            None
        }

        fn tick(&mut self, _frame: u32, input_mask: u32) -> Vec<Command> {
            if self.silent {
                return Vec::new();
            }
            let mut cmds = Vec::new();
            if input_mask & u32::from(button::RIGHT) != 0 {
                cmds.push(Command::Move { dx: 1 });
            } else if input_mask & u32::from(button::LEFT) != 0 {
                cmds.push(Command::Move { dx: -1 });
            } else {
                cmds.push(Command::Move { dx: 0 });
            }
            if self.with_anim {
                cmds.push(Command::Anim {
                    name: "walk".to_string(),
                });
            }
            cmds
        }

        fn snapshot(&self) {}

        fn restore(&mut self, _snap: &()) {}

        fn instantiate(&self) -> Self {
            Self {
                with_anim: self.with_anim,
                silent: self.silent,
            }
        }
    }

    fn walker() -> WalkerVm {
        WalkerVm {
            with_anim: false,
            silent: false,
        }
    }

    #[test]
    fn idle_script_holds_position() {
        let mut s = GameState::seed();
        let mut vm1 = walker();
        let mut vm2 = walker();
        for _ in 0..600 {
            advance(&mut s, 0, 0, &mut vm1, &mut vm2);
        }
        assert_eq!(s.frame, 600);
        assert_eq!(s.p1.x, -ONE);
        assert_eq!(s.p2.x, ONE);
        assert_eq!(s.p1.vx, 0);
        assert_eq!(s.p2.vx, 0);
    }

    #[test]
    fn sixty_frames_of_walking_cover_fifteen_units() {
        let mut s = GameState::seed();
        let mut vm1 = walker();
        let mut vm2 = walker();
        for _ in 0..60 {
            advance(&mut s, button::RIGHT, 0, &mut vm1, &mut vm2);
        }
        assert_eq!(s.p1.x, -ONE + 60 * WALK_SPEED);
        assert_eq!(s.p1.x, 917_504);
        assert_eq!(s.p2.x, ONE);
    }

    #[test]
    fn empty_commands_fall_back_to_direct_mapping() {
        let mut s = GameState::seed();
        let mut vm1 = WalkerVm {
            with_anim: false,
            silent: true,
        };
        let mut vm2 = walker();
        advance(&mut s, button::LEFT, 0, &mut vm1, &mut vm2);
        assert_eq!(s.p1.vx, -WALK_SPEED);
        advance(&mut s, 0, 0, &mut vm1, &mut vm2);
        assert_eq!(s.p1.vx, 0);
    }

    #[test]
    fn anim_command_stores_name_hash() {
        let mut s = GameState::seed();
        let mut vm1 = WalkerVm {
            with_anim: true,
            silent: false,
        };
        let mut vm2 = walker();
        advance(&mut s, 0, 0, &mut vm1, &mut vm2);
        assert_eq!(s.p1.anim, hash32("walk"));
        assert_eq!(s.p2.anim, 0);
    }

    #[test]
    fn frame_counter_wraps_at_u16() {
        let mut s = GameState::seed();
        s.frame = 0xFFFF;
        let mut vm1 = walker();
        let mut vm2 = walker();
        advance(&mut s, 0, 0, &mut vm1, &mut vm2);
        assert_eq!(s.frame, 0);
    }
}
