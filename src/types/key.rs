//! Logical identities for the physical controls.
//!
//! Hardware reports carry a one-byte key code; the enum discriminants are
//! those codes, so the mapping is bidirectional without any lookup table.

/// Rotary knobs, three per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Knob {
    /// Top-left knob.
    TopLeft = 0x01,
    /// Center-left knob.
    CenterLeft = 0x02,
    /// Bottom-left knob.
    BottomLeft = 0x03,
    /// Top-right knob.
    TopRight = 0x04,
    /// Center-right knob.
    CenterRight = 0x05,
    /// Bottom-right knob.
    BottomRight = 0x06,
}

impl Knob {
    /// Attempts to parse a knob from a hardware key code.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::TopLeft),
            0x02 => Some(Self::CenterLeft),
            0x03 => Some(Self::BottomLeft),
            0x04 => Some(Self::TopRight),
            0x05 => Some(Self::CenterRight),
            0x06 => Some(Self::BottomRight),
            _ => None,
        }
    }
}

impl From<Knob> for u8 {
    fn from(knob: Knob) -> Self {
        knob as Self
    }
}

/// Backlit push buttons along the bottom row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Button {
    /// The round home button.
    Home = 0x07,
    /// Numbered button 1.
    Action1 = 0x08,
    /// Numbered button 2.
    Action2 = 0x09,
    /// Numbered button 3.
    Action3 = 0x0A,
    /// Numbered button 4.
    Action4 = 0x0B,
    /// Numbered button 5.
    Action5 = 0x0C,
    /// Numbered button 6.
    Action6 = 0x0D,
    /// Numbered button 7.
    Action7 = 0x0E,
}

impl Button {
    /// Attempts to parse a button from a hardware key code.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x07 => Some(Self::Home),
            0x08 => Some(Self::Action1),
            0x09 => Some(Self::Action2),
            0x0A => Some(Self::Action3),
            0x0B => Some(Self::Action4),
            0x0C => Some(Self::Action5),
            0x0D => Some(Self::Action6),
            0x0E => Some(Self::Action7),
            _ => None,
        }
    }
}

impl From<Button> for u8 {
    fn from(button: Button) -> Self {
        button as Self
    }
}

/// Any pressable control. Knobs report presses too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// A rotary knob (pressed, not rotated).
    Knob(Knob),
    /// A push button.
    Button(Button),
}

impl Key {
    /// Attempts to parse any pressable control from a hardware key code.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        if let Some(knob) = Knob::from_byte(byte) {
            Some(Self::Knob(knob))
        } else if let Some(button) = Button::from_byte(byte) {
            Some(Self::Button(button))
        } else {
            None
        }
    }

    /// Returns the hardware key code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Knob(knob) => knob as u8,
            Self::Button(button) => button as u8,
        }
    }
}
