//! Modifier key transitions from FlagsChanged events
//!
//! macOS reports modifier keys only through flag changes. The generic
//! flags (Shift, Control, ...) are shared by the left and right keys, so
//! each side is read from its device-dependent bit instead.

use super::keys::VirtualKeyCode;

const NX_DEVICELCTLKEYMASK: u64 = 0x0000_0001;
const NX_DEVICELSHIFTKEYMASK: u64 = 0x0000_0002;
const NX_DEVICERSHIFTKEYMASK: u64 = 0x0000_0004;
const NX_DEVICELCMDKEYMASK: u64 = 0x0000_0008;
const NX_DEVICERCMDKEYMASK: u64 = 0x0000_0010;
const NX_DEVICELALTKEYMASK: u64 = 0x0000_0020;
const NX_DEVICERALTKEYMASK: u64 = 0x0000_0040;
const NX_DEVICERCTLKEYMASK: u64 = 0x0000_2000;

/// `kCGEventFlagMaskSecondaryFn`; there is only one Fn key
const FN_KEY_MASK: u64 = 0x0080_0000;

const CAPS_LOCK: u32 = 0x39;

/// What a FlagsChanged event means for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Down,
    Up,
    /// Caps lock toggles a latch rather than reporting a held state, so
    /// each change counts as a press immediately followed by a release
    Tap,
}

/// Device-dependent flag bit for a modifier key code
fn device_mask(code: VirtualKeyCode) -> Option<u64> {
    match code.0 {
        0x3B => Some(NX_DEVICELCTLKEYMASK),
        0x3E => Some(NX_DEVICERCTLKEYMASK),
        0x38 => Some(NX_DEVICELSHIFTKEYMASK),
        0x3C => Some(NX_DEVICERSHIFTKEYMASK),
        0x37 => Some(NX_DEVICELCMDKEYMASK),
        0x36 => Some(NX_DEVICERCMDKEYMASK),
        0x3A => Some(NX_DEVICELALTKEYMASK),
        0x3D => Some(NX_DEVICERALTKEYMASK),
        0x3F => Some(FN_KEY_MASK),
        _ => None,
    }
}

/// Translate a FlagsChanged event for `code` given the raw flag bits
///
/// Returns `None` for key codes that are not modifiers.
pub fn modifier_transition(code: VirtualKeyCode, flags: u64) -> Option<KeyTransition> {
    if code.0 == CAPS_LOCK {
        return Some(KeyTransition::Tap);
    }

    let mask = device_mask(code)?;
    if flags & mask != 0 {
        Some(KeyTransition::Down)
    } else {
        Some(KeyTransition::Up)
    }
}
