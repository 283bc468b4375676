//! P1 joypad register and button state, decoupled from any particular
//! windowing/input crate so host applications can feed it whatever their
//! own input layer produces.

/// The eight physical Game Boy buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

#[derive(Clone, Debug, Default)]
pub struct JoypadState {
    pub right: bool,
    pub left: bool,
    pub up: bool,
    pub down: bool,
    pub a: bool,
    pub b: bool,
    pub select: bool,
    pub start: bool,
}

/// Manages Joypad state and interaction with the P1 register.
#[derive(Clone, Debug, Default)]
pub struct Joypad {
    state: JoypadState,
    // Store the P1 register's selectable bits (written by the game)
    p1_register_selection: u8, // Bits 4 and 5
}

impl Joypad {
    pub fn new() -> Self {
        Joypad {
            state: JoypadState::default(),
            p1_register_selection: 0x30,
        }
    }

    /// Reads the P1 (Joypad) register based on current state and selection.
    pub fn read_p1(&self) -> u8 {
        let mut joypad_value = 0x0F;

        if self.p1_register_selection & 0x20 == 0 {
            if self.state.a {
                joypad_value &= 0b1110;
            }
            if self.state.b {
                joypad_value &= 0b1101;
            }
            if self.state.select {
                joypad_value &= 0b1011;
            }
            if self.state.start {
                joypad_value &= 0b0111;
            }
        }
        if self.p1_register_selection & 0x10 == 0 {
            if self.state.right {
                joypad_value &= 0b1110;
            }
            if self.state.left {
                joypad_value &= 0b1101;
            }
            if self.state.up {
                joypad_value &= 0b1011;
            }
            if self.state.down {
                joypad_value &= 0b0111;
            }
        }

        joypad_value | self.p1_register_selection | 0xC0
    }

    /// Writes to the P1 (Joypad) register (only bits 4, 5 are writable).
    pub fn write_p1(&mut self, value: u8) {
        self.p1_register_selection = value & 0x30;
    }

    /// Handles a key press. Returns true if a Joypad interrupt should fire,
    /// which happens only on a released -> pressed transition whose button
    /// group (directions/actions) is currently selected by the game.
    pub fn key_down(&mut self, key: Key) -> bool {
        let (was_pressed, group_selected) = match key {
            Key::Right => (self.state.right, self.p1_register_selection & 0x10 == 0),
            Key::Left => (self.state.left, self.p1_register_selection & 0x10 == 0),
            Key::Up => (self.state.up, self.p1_register_selection & 0x10 == 0),
            Key::Down => (self.state.down, self.p1_register_selection & 0x10 == 0),
            Key::A => (self.state.a, self.p1_register_selection & 0x20 == 0),
            Key::B => (self.state.b, self.p1_register_selection & 0x20 == 0),
            Key::Select => (self.state.select, self.p1_register_selection & 0x20 == 0),
            Key::Start => (self.state.start, self.p1_register_selection & 0x20 == 0),
        };

        match key {
            Key::Right => self.state.right = true,
            Key::Left => self.state.left = true,
            Key::Up => self.state.up = true,
            Key::Down => self.state.down = true,
            Key::A => self.state.a = true,
            Key::B => self.state.b = true,
            Key::Select => self.state.select = true,
            Key::Start => self.state.start = true,
        }

        !was_pressed && group_selected
    }

    /// Handles a key release.
    pub fn key_up(&mut self, key: Key) {
        match key {
            Key::Right => self.state.right = false,
            Key::Left => self.state.left = false,
            Key::Up => self.state.up = false,
            Key::Down => self.state.down = false,
            Key::A => self.state.a = false,
            Key::B => self.state.b = false,
            Key::Select => self.state.select = false,
            Key::Start => self.state.start = false,
        }
    }

    pub fn get_state(&self) -> &JoypadState {
        &self.state
    }

    pub fn save_state(&self, out: &mut Vec<u8>) {
        let mut bits = 0u8;
        for (i, pressed) in [
            self.state.right,
            self.state.left,
            self.state.up,
            self.state.down,
            self.state.a,
            self.state.b,
            self.state.select,
            self.state.start,
        ]
        .iter()
        .enumerate()
        {
            if *pressed {
                bits |= 1 << i;
            }
        }
        out.push(bits);
        out.push(self.p1_register_selection);
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<usize, String> {
        if data.len() < 2 {
            return Err("joypad state truncated".to_string());
        }
        let bits = data[0];
        self.state = JoypadState {
            right: bits & 0x01 != 0,
            left: bits & 0x02 != 0,
            up: bits & 0x04 != 0,
            down: bits & 0x08 != 0,
            a: bits & 0x10 != 0,
            b: bits & 0x20 != 0,
            select: bits & 0x40 != 0,
            start: bits & 0x80 != 0,
        };
        self.p1_register_selection = data[1] & 0x30;
        Ok(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_action_buttons_exposes_only_them() {
        let mut joypad = Joypad::new();
        joypad.key_down(Key::A);
        joypad.key_down(Key::Up);

        joypad.write_p1(0x20); // bit4=0 selects directions, bit5=1 leaves actions unselected
        let p1 = joypad.read_p1();
        assert_eq!(p1 & 0x0F, 0b1011); // Up pressed -> bit 2 low
    }

    #[test]
    fn key_down_edge_requests_interrupt_only_when_group_selected() {
        let mut joypad = Joypad::new();
        joypad.write_p1(0x10); // directions selected (bit 4 = 0), actions not
        assert!(joypad.key_down(Key::Up));
        assert!(!joypad.key_down(Key::A)); // actions not selected, no edge-triggered irq

        joypad.key_up(Key::Up);
        assert!(!joypad.key_down(Key::B)); // still only directions selected
    }

    #[test]
    fn repeated_key_down_is_not_a_new_edge() {
        let mut joypad = Joypad::new();
        joypad.write_p1(0x10);
        assert!(joypad.key_down(Key::Down));
        assert!(!joypad.key_down(Key::Down));
    }

    #[test]
    fn save_then_load_state_round_trips() {
        let mut joypad = Joypad::new();
        joypad.key_down(Key::A);
        joypad.key_down(Key::Left);
        joypad.write_p1(0x00);

        let mut buf = Vec::new();
        joypad.save_state(&mut buf);

        let mut restored = Joypad::new();
        restored.load_state(&buf).unwrap();
        assert_eq!(restored.read_p1(), joypad.read_p1());
    }
}
