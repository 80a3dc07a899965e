pub mod flows;
pub mod setup;
pub mod ui;
