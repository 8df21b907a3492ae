pub mod core;
pub mod curricula;
pub mod render;
pub mod report_cards;
pub mod scores;
pub mod setup;
pub mod workflow;
