pub mod scheduler;
pub mod settings;
pub mod sound;
