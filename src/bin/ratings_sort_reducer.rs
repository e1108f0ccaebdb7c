extern crate efflux;

use ratings_breakdown::streaming::{fail, SortReducer, StreamingSettings};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // must run as the only reduce task of the second step
    let settings = StreamingSettings::from_env().unwrap_or_else(|e| fail(e));
    efflux::run_reducer(SortReducer::new(&settings));
}
