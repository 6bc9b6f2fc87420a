use simplelog::{ConfigBuilder, LevelFilter, SimpleLogger};

/// Info when verbose, otherwise warnings and up. JSON output only lets errors through
/// unless verbose was asked for explicitly.
pub fn level_for(verbose: bool, json: bool) -> LevelFilter {
    match (verbose, json) {
        (true, _) => LevelFilter::Info,
        (false, true) => LevelFilter::Error,
        (false, false) => LevelFilter::Warn,
    }
}

pub fn init(verbose: bool, json: bool) {
    let config = ConfigBuilder::new()
        .add_filter_allow_str("eco_buddy")
        .set_target_level(LevelFilter::Off)
        .build();
    let _ = SimpleLogger::init(level_for(verbose, json), config);
}
