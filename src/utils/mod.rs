pub mod locator;
pub mod setting;
