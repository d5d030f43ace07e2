// Messaging - Lock-free hand-off from device threads to the event loop

pub mod channels;
