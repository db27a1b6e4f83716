// Messaging - Scheduler to audio callback communication

pub mod channels;
pub mod command;
