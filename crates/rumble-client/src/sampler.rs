//! Local input sampling.
//!
//! The orchestrator samples one mask per tick through the `InputSource`
//! seam. The browser implementation keeps a mask current from keydown and
//! keyup listeners on the window; sampling never touches the DOM.

use std::cell::Cell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::KeyboardEvent;

use rumble_core::input::button;

pub trait InputSource {
    /// Current mask of held logical buttons.
    fn sample(&self) -> u16;
}

/// An input source that always reports nothing pressed.
pub struct NullInput;

impl InputSource for NullInput {
    fn sample(&self) -> u16 {
        0
    }
}

fn mask_for(code: &str) -> u16 {
    match code {
        "ArrowUp" | "KeyW" => button::UP,
        "ArrowDown" | "KeyS" => button::DOWN,
        "ArrowLeft" | "KeyA" => button::LEFT,
        "ArrowRight" | "KeyD" => button::RIGHT,
        "KeyJ" => button::LIGHT_PUNCH,
        "KeyK" => button::HEAVY_PUNCH,
        "KeyN" => button::LIGHT_KICK,
        "KeyM" => button::HEAVY_KICK,
        "Enter" => button::START,
        _ => 0,
    }
}

/// Keyboard adapter producing the input bitmask.
pub struct KeyboardSampler {
    held: Rc<Cell<u16>>,
    // Listeners stay registered for the sampler's lifetime.
    _on_down: Closure<dyn FnMut(KeyboardEvent)>,
    _on_up: Closure<dyn FnMut(KeyboardEvent)>,
}

impl KeyboardSampler {
    /// Attach key listeners to the window. Returns `None` outside a
    /// browsing context.
    pub fn attach() -> Option<Self> {
        let window = web_sys::window()?;
        let held = Rc::new(Cell::new(0u16));

        let held_down = held.clone();
        let on_down = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            let bit = mask_for(&event.code());
            if bit != 0 {
                held_down.set(held_down.get() | bit);
                event.prevent_default();
            }
        });
        let held_up = held.clone();
        let on_up = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            let bit = mask_for(&event.code());
            if bit != 0 {
                held_up.set(held_up.get() & !bit);
            }
        });

        window
            .add_event_listener_with_callback("keydown", on_down.as_ref().unchecked_ref())
            .ok()?;
        window
            .add_event_listener_with_callback("keyup", on_up.as_ref().unchecked_ref())
            .ok()?;

        Some(Self {
            held,
            _on_down: on_down,
            _on_up: on_up,
        })
    }
}

impl InputSource for KeyboardSampler {
    fn sample(&self) -> u16 {
        self.held.get()
    }
}
