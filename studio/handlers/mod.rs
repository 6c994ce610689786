pub mod catalog;
pub mod events;
pub mod export;
pub mod inference;
pub mod training;
pub mod weights;
