// Communication channels lock-free

use crate::midi::event::InputMessage;
use ringbuf::{HeapRb, traits::Split};

/// Written by the device callback thread
pub type InputProducer = ringbuf::HeapProd<InputMessage>;
/// Drained by the event loop, in arrival order
pub type InputConsumer = ringbuf::HeapCons<InputMessage>;

pub fn create_input_channel(capacity: usize) -> (InputProducer, InputConsumer) {
    let rb = HeapRb::<InputMessage>::new(capacity);
    rb.split()
}
