// Lock-free sound command channel between the scheduler and the audio callback

use crate::messaging::command::SoundCommand;
use ringbuf::{HeapRb, traits::Split};

pub type SoundProducer = ringbuf::HeapProd<SoundCommand>;
pub type SoundConsumer = ringbuf::HeapCons<SoundCommand>;

/// Smallest ring the engine will create; a fast bar at the widest horizon
/// queues well under this many events per tick
pub const MIN_SOUND_CAPACITY: usize = 64;

pub fn create_sound_channel(capacity: usize) -> (SoundProducer, SoundConsumer) {
    let rb = HeapRb::<SoundCommand>::new(capacity.max(MIN_SOUND_CAPACITY));
    rb.split()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::ClickMode;
    use ringbuf::traits::{Consumer, Observer, Producer};

    #[test]
    fn test_fifo_order_and_capacity() {
        let (mut tx, mut rx) = create_sound_channel(1);
        assert_eq!(tx.capacity().get(), MIN_SOUND_CAPACITY);

        tx.try_push(SoundCommand::SilenceNotes).unwrap();
        tx.try_push(SoundCommand::Click {
            at_sample: 10,
            accented: true,
            mode: ClickMode::Normal,
        })
        .unwrap();

        assert_eq!(rx.try_pop(), Some(SoundCommand::SilenceNotes));
        assert_eq!(rx.try_pop().and_then(|c| c.at_sample()), Some(10));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_full_ring_rejects() {
        let (mut tx, _rx) = create_sound_channel(MIN_SOUND_CAPACITY);
        for _ in 0..MIN_SOUND_CAPACITY {
            assert!(tx.try_push(SoundCommand::SilenceNotes).is_ok());
        }
        assert!(tx.try_push(SoundCommand::SilenceNotes).is_err());
    }
}
