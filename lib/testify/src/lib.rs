pub mod http;
pub mod temp;
pub mod wait;

pub use temp::{temp_dir, temp_file};

pub fn trace_init() {
    let levels = std::env::var("TEST_LOG").unwrap_or_else(|_| "warn".into());

    framework::trace::init(false, &levels)
}
