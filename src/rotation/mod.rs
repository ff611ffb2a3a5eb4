pub mod event_day;
pub mod locator;
pub mod model;
pub mod phase;
