pub mod encoder;
pub mod keys;
pub mod state;
