pub mod patch;
pub mod time;
pub mod validation;
