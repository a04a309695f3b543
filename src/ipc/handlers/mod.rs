pub mod backup;
pub mod core;
pub mod entries;
pub mod reports;
pub mod results;
pub mod rosters;
pub mod setup;
