pub mod frames;
pub mod interaction;
pub mod resize;
