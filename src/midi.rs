//! MIDI Input
//!
//! Decodes raw channel messages into [`MidiMessage`]s and tracks held keys in
//! a monophonic, last-note-priority [`NoteStack`]. Channel is ignored.

use serde::{Deserialize, Serialize};

/// Controller number of the modulation wheel
pub const CC_MOD_WHEEL: u8 = 1;

const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Decoded channel message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    AllNotesOff,
}

impl MidiMessage {
    /// Decode a 2- or 3-byte message. Unsupported messages yield `None`.
    pub fn from_bytes(msg: &[u8]) -> Option<Self> {
        let (&status, data) = msg.split_first()?;

        match (status & 0xF0, data) {
            (0x90, &[note, velocity, ..]) if velocity > 0 => Some(MidiMessage::NoteOn {
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            }),
            // Note on with velocity 0 is a note off
            (0x80, &[note, _, ..]) | (0x90, &[note, _, ..]) => {
                Some(MidiMessage::NoteOff { note: note & 0x7F })
            }
            (0xB0, &[CC_ALL_SOUND_OFF, _, ..]) | (0xB0, &[CC_ALL_NOTES_OFF, _, ..]) => {
                Some(MidiMessage::AllNotesOff)
            }
            (0xB0, &[controller, value, ..]) => Some(MidiMessage::ControlChange {
                controller: controller & 0x7F,
                value: value & 0x7F,
            }),
            _ => None,
        }
    }
}

/// A message scheduled at a frame offset within the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub offset: usize,
    pub message: MidiMessage,
}

impl MidiEvent {
    /// Event at `offset` frames into the block
    pub fn new(offset: usize, message: MidiMessage) -> Self {
        Self { offset, message }
    }

    /// Note-on at `offset`
    pub fn note_on(offset: usize, note: u8, velocity: u8) -> Self {
        Self::new(offset, MidiMessage::NoteOn { note, velocity })
    }

    /// Note-off at `offset`
    pub fn note_off(offset: usize, note: u8) -> Self {
        Self::new(offset, MidiMessage::NoteOff { note })
    }

    /// Control change at `offset`
    pub fn control_change(offset: usize, controller: u8, value: u8) -> Self {
        Self::new(offset, MidiMessage::ControlChange { controller, value })
    }
}

/// Equal-tempered frequency of a MIDI note (A4 = note 69 = 440 Hz)
#[inline]
pub fn note_to_frequency(note: u8) -> f64 {
    440.0 * libm::exp2((note as f64 - 69.0) / 12.0)
}

/// Map a 7-bit controller value to [-1, 1] with 64 at the centre
#[inline]
pub fn cc_to_bipolar(value: u8) -> f64 {
    ((value as f64 - 64.0) / 63.5).clamp(-1.0, 1.0)
}

/// Held keys, most recent last
///
/// Storage for all 128 notes is reserved up front, so pushes never allocate.
#[derive(Debug, Clone)]
pub struct NoteStack {
    held: Vec<u8>,
}

impl NoteStack {
    /// Empty note stack
    pub fn new() -> Self {
        Self {
            held: Vec::with_capacity(128),
        }
    }

    /// Press a key; it becomes the sounding note
    pub fn push(&mut self, note: u8) {
        self.held.retain(|&n| n != note);
        self.held.push(note);
    }

    /// Release a key and return the note that should sound afterwards
    pub fn release(&mut self, note: u8) -> Option<u8> {
        self.held.retain(|&n| n != note);
        self.current()
    }

    /// Most recently pressed note still held
    pub fn current(&self) -> Option<u8> {
        self.held.last().copied()
    }

    /// Forget every held note
    pub fn clear(&mut self) {
        self.held.clear();
    }

    /// True when no note is held
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Held notes, oldest first
    pub fn held(&self) -> &[u8] {
        &self.held
    }
}

impl Default for NoteStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_note_messages() {
        assert_eq!(
            MidiMessage::from_bytes(&[0x90, 60, 100]),
            Some(MidiMessage::NoteOn {
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0x93, 60, 0]),
            Some(MidiMessage::NoteOff { note: 60 })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0x80, 61, 40]),
            Some(MidiMessage::NoteOff { note: 61 })
        );
    }

    #[test]
    fn test_decode_control_change() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xB0, 1, 127]),
            Some(MidiMessage::ControlChange {
                controller: 1,
                value: 127
            })
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0xB5, 123, 0]),
            Some(MidiMessage::AllNotesOff)
        );
    }

    #[test]
    fn test_decode_rejects_unsupported() {
        assert_eq!(MidiMessage::from_bytes(&[]), None);
        assert_eq!(MidiMessage::from_bytes(&[0x90, 60]), None);
        // Pitch bend and aftertouch are not used
        assert_eq!(MidiMessage::from_bytes(&[0xE0, 0, 64]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xD0, 90]), None);
    }

    #[test]
    fn test_note_to_frequency() {
        assert!((note_to_frequency(69) - 440.0).abs() < 1e-9);
        assert!((note_to_frequency(57) - 220.0).abs() < 1e-9);
        assert!((note_to_frequency(60) - 261.6256).abs() < 0.001);
    }

    #[test]
    fn test_cc_to_bipolar() {
        assert_eq!(cc_to_bipolar(64), 0.0);
        assert_eq!(cc_to_bipolar(127), 63.0 / 63.5);
        assert_eq!(cc_to_bipolar(0), -1.0);
    }

    #[test]
    fn test_note_stack_legato() {
        let mut stack = NoteStack::new();
        stack.push(60);
        stack.push(64);
        assert_eq!(stack.current(), Some(64));

        // Releasing the sounding key falls back to the previous one
        assert_eq!(stack.release(64), Some(60));
        assert_eq!(stack.release(60), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_note_stack_release_of_background_key() {
        let mut stack = NoteStack::new();
        stack.push(60);
        stack.push(64);
        stack.push(67);
        assert_eq!(stack.release(64), Some(67));
        assert_eq!(stack.held(), &[60, 67]);
    }

    #[test]
    fn test_note_stack_repress_moves_to_top() {
        let mut stack = NoteStack::new();
        stack.push(60);
        stack.push(64);
        stack.push(60);
        assert_eq!(stack.held(), &[64, 60]);

        stack.clear();
        assert_eq!(stack.current(), None);
    }
}
