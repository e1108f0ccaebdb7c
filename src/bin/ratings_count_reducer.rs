extern crate efflux;

use ratings_breakdown::streaming::{fail, CountReducer, StreamingSettings};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = StreamingSettings::from_env().unwrap_or_else(|e| fail(e));
    efflux::run_reducer(CountReducer::new(&settings));
}
