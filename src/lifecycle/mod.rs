mod controller;

pub use controller::{LifecycleController, DEFAULT_PAGE_SIZE};
