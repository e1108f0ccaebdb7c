extern crate efflux;

use ratings_breakdown::streaming::{fail, RatingsMapper, StreamingSettings};

fn main() {
    // stdout carries the job data, so logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = StreamingSettings::from_env().unwrap_or_else(|e| fail(e));
    efflux::run_mapper(RatingsMapper::new(&settings));
}
