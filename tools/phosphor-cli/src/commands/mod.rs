pub mod check;
pub mod export;
pub mod frames;
pub mod record;
