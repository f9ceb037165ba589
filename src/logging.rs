// logging.rs — logger installation. Diagnostics mode logs at `Debug`, otherwise only
// warnings and errors reach the console.

use log::LevelFilter;

pub fn level(diagnostics: bool) -> LevelFilter {
    if diagnostics {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Install the platform logger. Later calls only adjust the level.
#[cfg(target_arch = "wasm32")]
pub fn init(diagnostics: bool) {
    console_error_panic_hook::set_once();
    let filter = level(diagnostics);
    if let Some(level) = filter.to_level() {
        let _ = console_log::init_with_level(level);
    }
    log::set_max_level(filter);
}

/// Install the platform logger. Later calls only adjust the level.
#[cfg(not(target_arch = "wasm32"))]
pub fn init(diagnostics: bool) {
    let filter = level(diagnostics);
    let _ = env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .try_init();
    log::set_max_level(filter);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_raise_the_level() {
        assert_eq!(level(true), LevelFilter::Debug);
        assert_eq!(level(false), LevelFilter::Warn);
    }
}
