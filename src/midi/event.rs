// MIDI channel messages as they appear inside a track chunk

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    /// Any other channel message; parsed only to keep the stream aligned
    Other { status: u8 },
}

impl MidiEvent {
    /// Number of data bytes following a channel status byte
    pub fn data_len(status: u8) -> usize {
        match status & 0xF0 {
            0xC0 | 0xD0 => 1,
            _ => 2,
        }
    }

    /// Parse a channel message (status byte followed by its data bytes)
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if !(0x80..0xF0).contains(&status) || data.len() < Self::data_len(status) {
            return None;
        }

        let channel = status & 0x0F;
        let event = match status & 0xF0 {
            0x90 if data[1] == 0 => MidiEvent::NoteOff {
                channel,
                note: data[0],
            },
            0x90 => MidiEvent::NoteOn {
                channel,
                note: data[0],
                velocity: data[1],
            },
            0x80 => MidiEvent::NoteOff {
                channel,
                note: data[0],
            },
            _ => MidiEvent::Other { status },
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on() {
        let event = MidiEvent::from_bytes(&[0x90, 60, 100]).unwrap();
        assert_eq!(
            event,
            MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_note_off_explicit() {
        let event = MidiEvent::from_bytes(&[0x83, 60, 40]).unwrap();
        assert_eq!(event, MidiEvent::NoteOff { channel: 3, note: 60 });
    }

    #[test]
    fn test_note_off_velocity_zero() {
        // Note On with velocity 0 is a Note Off
        let event = MidiEvent::from_bytes(&[0x9F, 64, 0]).unwrap();
        assert_eq!(event, MidiEvent::NoteOff { channel: 15, note: 64 });
    }

    #[test]
    fn test_program_change_has_one_data_byte() {
        assert_eq!(MidiEvent::data_len(0xC5), 1);
        assert_eq!(MidiEvent::data_len(0xD0), 1);
        assert_eq!(MidiEvent::data_len(0xB0), 2);
        assert_eq!(
            MidiEvent::from_bytes(&[0xC5, 12]),
            Some(MidiEvent::Other { status: 0xC5 })
        );
    }

    #[test]
    fn test_invalid_messages() {
        assert!(MidiEvent::from_bytes(&[]).is_none());
        // Note On without velocity
        assert!(MidiEvent::from_bytes(&[0x90, 60]).is_none());
        // System messages are not channel messages
        assert!(MidiEvent::from_bytes(&[0xF0, 0x00, 0x00]).is_none());
        // Data byte where a status is expected
        assert!(MidiEvent::from_bytes(&[0x40, 0x00, 0x00]).is_none());
    }
}
