/// Uses env_logger. You can adjust the log level without recompiling with
/// the RUST_LOG env variable:
///
///     RUST_LOG=debug cargo run --bin cli
///
/// This can be done on a per lib or module basis:
///
///     RUST_LOG=transit_model=debug cargo run --bin cli
pub fn setup() {
    setup_with_filter("info");
}

pub fn setup_with_filter(default_filter: &str) {
    use env_logger::{Builder, Env};
    Builder::from_env(Env::default().default_filter_or(default_filter)).init();
}
